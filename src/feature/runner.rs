//! Feature calculation entry point
//!
//! Executes one feature calculation for a feature execution: resolves the
//! watermark, fetches the input frames, hands them to the configured feature
//! connector, and persists the returned points.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::connector::{ConnectorRegistry, InputFrame, ResultPoint};
use crate::pipeline::{PipelineError, PipelineResult};
use crate::schema::parse_lookback;
use crate::storage::{bulk_upsert, Dataset, MarketDataRepository, Value};

use super::WatermarkResolver;

/// Upsert key for the result table
pub const RESULT_UNIQUE_COLUMNS: [&str; 2] = ["feature_execution_id", "time"];

/// Result of one feature calculation run
#[derive(Debug, Clone, Default)]
pub struct FeatureRunReport {
    pub feature_execution_id: i64,
    /// Resolved window start; `None` when there was nothing to calculate
    pub from_date: Option<DateTime<Utc>>,
    pub points_computed: usize,
    pub results_written: u64,
}

/// Feature calculation pipeline
pub struct FeatureRunner {
    repository: Arc<MarketDataRepository>,
    registry: Arc<ConnectorRegistry>,
}

impl FeatureRunner {
    pub fn new(repository: Arc<MarketDataRepository>, registry: Arc<ConnectorRegistry>) -> Self {
        Self {
            repository,
            registry,
        }
    }

    /// Run the calculation for one feature execution.
    pub async fn run(&self, feature_execution_id: i64) -> PipelineResult<FeatureRunReport> {
        let mut report = FeatureRunReport {
            feature_execution_id,
            ..Default::default()
        };

        let execution = self
            .repository
            .get_feature_execution(feature_execution_id)
            .await?;
        let feature = self.repository.get_feature(execution.feature_id).await?;

        if !execution.active || !feature.active {
            debug!("Feature execution {} is inactive, skipping", execution.name);
            return Ok(report);
        }

        let lookback = parse_lookback(&feature.lookback)
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        let connector = self.registry.feature(&feature.connector)?;

        let resolver = WatermarkResolver::new(self.repository.pool().clone());
        let Some(from) = resolver.data_from_date(execution.id, lookback).await? else {
            debug!(
                "No candle data left to calculate for feature execution {}",
                execution.name
            );
            return Ok(report);
        };
        report.from_date = Some(from);

        let inputs = self.repository.execution_inputs(execution.id).await?;
        if inputs.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "Feature execution {} has no inputs",
                execution.name
            )));
        }

        let mut frames: Vec<InputFrame> = Vec::with_capacity(inputs.len());
        for input in &inputs {
            frames.push(resolver.fetch_input_frame(execution.id, input, from).await?);
        }

        debug!(
            "Running {} for execution {} from {}",
            feature.name, execution.name, from
        );
        let points = connector.execute(lookback, &frames).await?;
        report.points_computed = points.len();

        report.results_written = self.write_results(execution.id, &points).await?;

        info!(
            "Feature execution {}: {} points computed, {} results written",
            execution.name, report.points_computed, report.results_written
        );

        Ok(report)
    }

    async fn write_results(
        &self,
        feature_execution_id: i64,
        points: &[ResultPoint],
    ) -> PipelineResult<u64> {
        let mut dataset = Dataset::new(["time", "result"]);
        for point in points {
            dataset.push_row([Value::Timestamp(point.time), Value::Decimal(point.result)]);
        }
        dataset.add_constant_column("feature_execution_id", Value::BigInt(feature_execution_id));

        let written = bulk_upsert(
            self.repository.pool(),
            "feature_execution_result",
            &dataset,
            &RESULT_UNIQUE_COLUMNS,
            Some(self.repository.batch_size()),
        )
        .await?;

        Ok(written)
    }
}
