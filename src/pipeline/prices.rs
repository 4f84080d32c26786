//! Price retrieval pipeline
//!
//! Brings each enabled source-symbol's candle history for one source-period
//! configuration up to the current time. The last stored candle per symbol is
//! the watermark; the upsert key (source_symbol, time, period) makes
//! overlapping or re-fetched ranges converge instead of duplicating.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::connector::{ConnectorError, ConnectorRegistry};
use crate::schema::CandleBar;
use crate::storage::{bulk_upsert, Dataset, MarketDataRepository, Value};

use super::{PipelineError, PipelineResult};

/// Upsert key for the candle table
pub const CANDLE_UNIQUE_COLUMNS: [&str; 3] = ["source_symbol_id", "time", "period"];

/// Outcome of one symbol within a retrieval run
#[derive(Debug, Clone)]
pub struct SymbolOutcome {
    pub symbol: String,
    pub rows_fetched: usize,
    pub rows_upserted: u64,
    /// Why the symbol was skipped, if it was
    pub skipped: Option<String>,
}

/// Result of one retrieval run
#[derive(Debug, Clone, Default)]
pub struct RetrievalReport {
    pub source_period_id: i64,
    pub outcomes: Vec<SymbolOutcome>,
}

impl RetrievalReport {
    pub fn total_fetched(&self) -> usize {
        self.outcomes.iter().map(|o| o.rows_fetched).sum()
    }

    pub fn total_upserted(&self) -> u64 {
        self.outcomes.iter().map(|o| o.rows_upserted).sum()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.skipped.is_some()).count()
    }
}

/// Price retrieval pipeline
pub struct PriceRetriever {
    repository: Arc<MarketDataRepository>,
    registry: Arc<ConnectorRegistry>,
}

impl PriceRetriever {
    pub fn new(repository: Arc<MarketDataRepository>, registry: Arc<ConnectorRegistry>) -> Self {
        Self {
            repository,
            registry,
        }
    }

    /// Run retrieval for one source-period configuration.
    ///
    /// A symbol whose connector call fails is skipped with a warning; the run
    /// continues with its siblings. Malformed configuration aborts the run.
    pub async fn run(&self, source_period_id: i64) -> PipelineResult<RetrievalReport> {
        let mut report = RetrievalReport {
            source_period_id,
            outcomes: Vec::new(),
        };

        let source_period = self.repository.get_source_period(source_period_id).await?;
        if !source_period.active {
            debug!(
                "Source period {} is inactive, skipping retrieval",
                source_period_id
            );
            return Ok(report);
        }

        let source = self.repository.get_source(source_period.source_id).await?;
        if !source.active {
            debug!("Source {} is inactive, skipping retrieval", source.name);
            return Ok(report);
        }

        debug!(
            "Getting price data for {} for period {}",
            source.name, source_period.period
        );

        let params = source
            .connection_params()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        let connector = self.registry.source(&source.connector, &params)?;

        let source_symbols = self.repository.enabled_source_symbols(source.id).await?;

        for source_symbol in source_symbols {
            let last = self
                .repository
                .latest_candle_time(source_symbol.id, source_period.period)
                .await?;
            let from = next_from_date(last, source_period.start_from);
            let to = Utc::now();

            match connector
                .get_prices(
                    &source_symbol.symbol_name,
                    from,
                    to,
                    source_period.period,
                    &source_symbol.symbol_info,
                )
                .await
            {
                Ok(bars) => {
                    debug!(
                        "{} {} candles retrieved from {} for {} to {}",
                        bars.len(),
                        source_period.period,
                        source.name,
                        source_symbol.symbol_name,
                        to
                    );

                    let mut dataset = candle_dataset(&bars);
                    dataset.add_constant_column("source_symbol_id", Value::BigInt(source_symbol.id));

                    let upserted = bulk_upsert(
                        self.repository.pool(),
                        "candle",
                        &dataset,
                        &CANDLE_UNIQUE_COLUMNS,
                        Some(self.repository.batch_size()),
                    )
                    .await?;

                    report.outcomes.push(SymbolOutcome {
                        symbol: source_symbol.symbol_name,
                        rows_fetched: bars.len(),
                        rows_upserted: upserted,
                        skipped: None,
                    });
                }
                Err(ConnectorError::DataNotAvailable(msg)) => {
                    warn!(
                        "No data available for {} from {}: {}",
                        source_symbol.symbol_name, source.name, msg
                    );
                    report.outcomes.push(SymbolOutcome {
                        symbol: source_symbol.symbol_name,
                        rows_fetched: 0,
                        rows_upserted: 0,
                        skipped: Some(msg),
                    });
                }
                Err(err) => {
                    // One symbol's connector failure must not abort its siblings
                    warn!(
                        "Retrieval failed for {} from {}: {}",
                        source_symbol.symbol_name, source.name, err
                    );
                    report.outcomes.push(SymbolOutcome {
                        symbol: source_symbol.symbol_name,
                        rows_fetched: 0,
                        rows_upserted: 0,
                        skipped: Some(err.to_string()),
                    });
                }
            }
        }

        info!(
            "Retrieval for source period {}: {} rows fetched, {} upserted, {} symbols skipped",
            source_period_id,
            report.total_fetched(),
            report.total_upserted(),
            report.skipped()
        );

        Ok(report)
    }
}

/// Start of the next retrieval window: one millisecond past the latest stored
/// candle, or the configured start date when no candle exists yet.
pub fn next_from_date(
    latest_candle: Option<DateTime<Utc>>,
    start_from: DateTime<Utc>,
) -> DateTime<Utc> {
    match latest_candle {
        Some(last) => last + Duration::milliseconds(1),
        None => start_from,
    }
}

/// Build the upsert dataset for a batch of bars. The owning source-symbol id
/// is appended separately as a constant column.
fn candle_dataset(bars: &[CandleBar]) -> Dataset {
    let mut dataset = Dataset::new([
        "time", "period", "bid_open", "bid_high", "bid_low", "bid_close", "ask_open", "ask_high",
        "ask_low", "ask_close", "volume",
    ]);

    for bar in bars {
        dataset.push_row([
            Value::Timestamp(bar.time),
            Value::Text(bar.period.as_str().to_string()),
            Value::Decimal(bar.bid_open),
            Value::Decimal(bar.bid_high),
            Value::Decimal(bar.bid_low),
            Value::Decimal(bar.bid_close),
            Value::Decimal(bar.ask_open),
            Value::Decimal(bar.ask_high),
            Value::Decimal(bar.ask_low),
            Value::Decimal(bar.ask_close),
            Value::BigInt(bar.volume),
        ]);
    }

    dataset
}
