//! Market data repository
//!
//! High-level data access for the configuration and market data entities.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::{ConnectionParams, DatabaseSettings, ParamsError};
use crate::error::{ErrorCategory, ErrorClassification};
use crate::schema::{CandlePeriod, InstrumentType, PeriodParseError};

/// Repository errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<ParamsError> for RepositoryError {
    fn from(err: ParamsError) -> Self {
        RepositoryError::Configuration(err.to_string())
    }
}

impl From<PeriodParseError> for RepositoryError {
    fn from(err: PeriodParseError) -> Self {
        RepositoryError::InvalidData(err.to_string())
    }
}

impl ErrorClassification for RepositoryError {
    fn category(&self) -> ErrorCategory {
        match self {
            RepositoryError::Database(_) => ErrorCategory::Transient,
            RepositoryError::Configuration(_) => ErrorCategory::Configuration,
            RepositoryError::NotFound(_) => ErrorCategory::Permanent,
            RepositoryError::InvalidData(_) => ErrorCategory::Permanent,
        }
    }

    fn suggested_retry_delay(&self) -> Option<Duration> {
        match self {
            RepositoryError::Database(_) => Some(Duration::from_millis(500)),
            _ => None,
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// A data source record
#[derive(Debug, Clone)]
pub struct Source {
    pub id: i64,
    pub name: String,
    /// Registered connector name
    pub connector: String,
    pub connection_params: serde_json::Value,
    pub active: bool,
}

impl Source {
    /// Validate the stored connection parameters into their typed form
    pub fn connection_params(&self) -> Result<ConnectionParams, ParamsError> {
        ConnectionParams::from_json(&self.connection_params)
    }
}

/// A tradable instrument
#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: i64,
    pub name: String,
    pub instrument_type: InstrumentType,
}

/// Link between a source and a symbol
#[derive(Debug, Clone)]
pub struct SourceSymbol {
    pub id: i64,
    pub source_id: i64,
    pub symbol_id: i64,
    /// Symbol name, joined in for connector requests and logging
    pub symbol_name: String,
    pub retrieve_prices: bool,
    pub symbol_info: serde_json::Value,
}

/// A (source, candle period) retrieval configuration
#[derive(Debug, Clone)]
pub struct SourcePeriod {
    pub id: i64,
    pub source_id: i64,
    pub period: CandlePeriod,
    pub start_from: DateTime<Utc>,
    pub active: bool,
}

/// A feature calculation definition
#[derive(Debug, Clone)]
pub struct Feature {
    pub id: i64,
    pub name: String,
    /// Registered feature connector name
    pub connector: String,
    /// Lookback window string, e.g. "1M", "30D"
    pub lookback: String,
    /// Run schedule string, e.g. "every 5m"
    pub schedule: String,
    pub active: bool,
}

/// One configured instance of a feature over specific inputs
#[derive(Debug, Clone)]
pub struct FeatureExecution {
    pub id: i64,
    pub feature_id: i64,
    pub name: String,
    pub active: bool,
}

/// One (source symbol, period) input of a feature execution
#[derive(Debug, Clone)]
pub struct FeatureExecutionInput {
    pub id: i64,
    pub feature_execution_id: i64,
    pub source_symbol_id: i64,
    pub period: CandlePeriod,
}

/// Summary batch status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    NotStarted,
    InProgress,
    Complete,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::NotStarted => "not_started",
            BatchStatus::InProgress => "in_progress",
            BatchStatus::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(BatchStatus::NotStarted),
            "in_progress" => Some(BatchStatus::InProgress),
            "complete" => Some(BatchStatus::Complete),
            _ => None,
        }
    }
}

/// One run of the summary aggregation job
#[derive(Debug, Clone)]
pub struct SummaryBatch {
    pub id: i64,
    pub time: DateTime<Utc>,
    pub status: BatchStatus,
}

/// One candle occurrence loaded for summary aggregation
#[derive(Debug, Clone)]
pub struct CoverageRow {
    pub source_period_id: i64,
    pub source_symbol_id: i64,
    pub symbol_id: i64,
    pub period: CandlePeriod,
    pub time: DateTime<Utc>,
}

/// Candle table statistics
#[derive(Debug, Clone)]
pub struct CandleStats {
    pub total_candles: u64,
    pub source_symbols: u64,
    pub earliest_time: Option<DateTime<Utc>>,
    pub latest_time: Option<DateTime<Utc>>,
}

/// Market data repository
pub struct MarketDataRepository {
    pool: PgPool,
    batch_size: usize,
}

impl MarketDataRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: PgPool, batch_size: usize) -> Self {
        Self { pool, batch_size }
    }

    /// Create a new repository from settings
    pub async fn from_settings(
        settings: &DatabaseSettings,
        batch_size: usize,
    ) -> RepositoryResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&settings.url)
            .await?;

        Ok(Self::new(pool, batch_size))
    }

    /// Get the database pool reference
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Default upsert batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    // ========================================================================
    // Sources and symbols
    // ========================================================================

    /// Get a source by id
    pub async fn get_source(&self, id: i64) -> RepositoryResult<Source> {
        let row = sqlx::query(
            r#"
            SELECT id, name, connector, connection_params, active
            FROM source
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("source {}", id)))?;

        Ok(source_from_row(&row))
    }

    /// Get a source by name
    pub async fn get_source_by_name(&self, name: &str) -> RepositoryResult<Source> {
        let row = sqlx::query(
            r#"
            SELECT id, name, connector, connection_params, active
            FROM source
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("source {}", name)))?;

        Ok(source_from_row(&row))
    }

    /// List active sources
    pub async fn list_active_sources(&self) -> RepositoryResult<Vec<Source>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, connector, connection_params, active
            FROM source
            WHERE active = TRUE
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(source_from_row).collect())
    }

    /// Get the symbol id for a name, creating the symbol if it is new.
    /// An existing symbol keeps its instrument class.
    pub async fn ensure_symbol(
        &self,
        name: &str,
        instrument_type: InstrumentType,
    ) -> RepositoryResult<i64> {
        if let Some(row) = sqlx::query("SELECT id FROM symbol WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok(row.get("id"));
        }

        let row = sqlx::query(
            r#"
            INSERT INTO symbol (name, instrument_type)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(instrument_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        debug!("Created symbol {}", name);
        Ok(row.get("id"))
    }

    /// Create the source-symbol link if missing, otherwise refresh its
    /// provider metadata. The retrieval flag of an existing link is kept.
    pub async fn ensure_source_symbol(
        &self,
        source_id: i64,
        symbol_id: i64,
        symbol_info: &serde_json::Value,
    ) -> RepositoryResult<i64> {
        let existing = sqlx::query(
            "SELECT id FROM source_symbol WHERE source_id = $1 AND symbol_id = $2",
        )
        .bind(source_id)
        .bind(symbol_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            let id: i64 = row.get("id");
            sqlx::query("UPDATE source_symbol SET symbol_info = $1 WHERE id = $2")
                .bind(symbol_info)
                .bind(id)
                .execute(&self.pool)
                .await?;
            return Ok(id);
        }

        let row = sqlx::query(
            r#"
            INSERT INTO source_symbol (source_id, symbol_id, retrieve_prices, symbol_info)
            VALUES ($1, $2, TRUE, $3)
            RETURNING id
            "#,
        )
        .bind(source_id)
        .bind(symbol_id)
        .bind(symbol_info)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    /// Source-symbol links with price retrieval enabled for a source
    pub async fn enabled_source_symbols(
        &self,
        source_id: i64,
    ) -> RepositoryResult<Vec<SourceSymbol>> {
        let rows = sqlx::query(
            r#"
            SELECT ss.id, ss.source_id, ss.symbol_id, s.name AS symbol_name,
                   ss.retrieve_prices, ss.symbol_info
            FROM source_symbol ss
                INNER JOIN symbol s ON s.id = ss.symbol_id
            WHERE ss.source_id = $1 AND ss.retrieve_prices = TRUE
            ORDER BY s.name
            "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SourceSymbol {
                id: row.get("id"),
                source_id: row.get("source_id"),
                symbol_id: row.get("symbol_id"),
                symbol_name: row.get("symbol_name"),
                retrieve_prices: row.get("retrieve_prices"),
                symbol_info: row.get("symbol_info"),
            })
            .collect())
    }

    // ========================================================================
    // Source periods and candles
    // ========================================================================

    /// Get a source-period configuration by id
    pub async fn get_source_period(&self, id: i64) -> RepositoryResult<SourcePeriod> {
        let row = sqlx::query(
            r#"
            SELECT id, source_id, period, start_from, active
            FROM source_period
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("source_period {}", id)))?;

        source_period_from_row(&row)
    }

    /// List active source-period configurations
    pub async fn list_active_source_periods(&self) -> RepositoryResult<Vec<SourcePeriod>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_id, period, start_from, active
            FROM source_period
            WHERE active = TRUE
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(source_period_from_row).collect()
    }

    /// Timestamp of the latest stored candle for a source-symbol and period
    pub async fn latest_candle_time(
        &self,
        source_symbol_id: i64,
        period: CandlePeriod,
    ) -> RepositoryResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            r#"
            SELECT MAX(time) AS latest
            FROM candle
            WHERE source_symbol_id = $1 AND period = $2
            "#,
        )
        .bind(source_symbol_id)
        .bind(period.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("latest"))
    }

    /// Candle table statistics for reporting
    pub async fn candle_stats(&self) -> RepositoryResult<CandleStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_candles,
                COUNT(DISTINCT source_symbol_id) AS source_symbols,
                MIN(time) AS earliest_time,
                MAX(time) AS latest_time
            FROM candle
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CandleStats {
            total_candles: row.get::<i64, _>("total_candles") as u64,
            source_symbols: row.get::<i64, _>("source_symbols") as u64,
            earliest_time: row.get("earliest_time"),
            latest_time: row.get("latest_time"),
        })
    }

    // ========================================================================
    // Features
    // ========================================================================

    /// Get a feature by id
    pub async fn get_feature(&self, id: i64) -> RepositoryResult<Feature> {
        let row = sqlx::query(
            r#"
            SELECT id, name, connector, lookback, schedule, active
            FROM feature
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("feature {}", id)))?;

        Ok(feature_from_row(&row))
    }

    /// Get a feature execution by id
    pub async fn get_feature_execution(&self, id: i64) -> RepositoryResult<FeatureExecution> {
        let row = sqlx::query(
            r#"
            SELECT id, feature_id, name, active
            FROM feature_execution
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("feature_execution {}", id)))?;

        Ok(feature_execution_from_row(&row))
    }

    /// List active feature executions
    pub async fn list_active_feature_executions(
        &self,
    ) -> RepositoryResult<Vec<FeatureExecution>> {
        let rows = sqlx::query(
            r#"
            SELECT fe.id, fe.feature_id, fe.name, fe.active
            FROM feature_execution fe
                INNER JOIN feature f ON f.id = fe.feature_id
            WHERE fe.active = TRUE AND f.active = TRUE
            ORDER BY fe.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(feature_execution_from_row).collect())
    }

    /// Inputs configured for a feature execution
    pub async fn execution_inputs(
        &self,
        feature_execution_id: i64,
    ) -> RepositoryResult<Vec<FeatureExecutionInput>> {
        let rows = sqlx::query(
            r#"
            SELECT id, feature_execution_id, source_symbol_id, period
            FROM feature_execution_input
            WHERE feature_execution_id = $1
            ORDER BY id
            "#,
        )
        .bind(feature_execution_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(FeatureExecutionInput {
                    id: row.get("id"),
                    feature_execution_id: row.get("feature_execution_id"),
                    source_symbol_id: row.get("source_symbol_id"),
                    period: CandlePeriod::parse(row.get::<String, _>("period").as_str())?,
                })
            })
            .collect()
    }

    // ========================================================================
    // Summary batches
    // ========================================================================

    /// Create a new summary batch in the given status
    pub async fn create_summary_batch(
        &self,
        time: DateTime<Utc>,
        status: BatchStatus,
    ) -> RepositoryResult<SummaryBatch> {
        let row = sqlx::query(
            r#"
            INSERT INTO summary_batch (time, status)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(time)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(SummaryBatch {
            id: row.get("id"),
            time,
            status,
        })
    }

    /// Update a summary batch's status
    pub async fn set_summary_batch_status(
        &self,
        batch_id: i64,
        status: BatchStatus,
    ) -> RepositoryResult<()> {
        sqlx::query("UPDATE summary_batch SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(batch_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Load every candle occurrence where retrieval is enabled, joined to its
    /// matching source-period configuration. This is the summary job's
    /// working set.
    pub async fn load_coverage_rows(&self) -> RepositoryResult<Vec<CoverageRow>> {
        let rows = sqlx::query(
            r#"
            SELECT sp.id AS source_period_id,
                   ss.id AS source_symbol_id,
                   ss.symbol_id AS symbol_id,
                   sp.period AS period,
                   cdl.time AS time
            FROM source_symbol ss
                INNER JOIN candle cdl
                    ON cdl.source_symbol_id = ss.id
                INNER JOIN source_period sp
                    ON ss.source_id = sp.source_id AND cdl.period = sp.period
            WHERE ss.retrieve_prices = TRUE
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!("Loaded {} coverage rows", rows.len());

        rows.iter()
            .map(|row| {
                Ok(CoverageRow {
                    source_period_id: row.get("source_period_id"),
                    source_symbol_id: row.get("source_symbol_id"),
                    symbol_id: row.get("symbol_id"),
                    period: CandlePeriod::parse(row.get::<String, _>("period").as_str())?,
                    time: row.get("time"),
                })
            })
            .collect()
    }
}

fn source_from_row(row: &sqlx::postgres::PgRow) -> Source {
    Source {
        id: row.get("id"),
        name: row.get("name"),
        connector: row.get("connector"),
        connection_params: row.get("connection_params"),
        active: row.get("active"),
    }
}

fn source_period_from_row(row: &sqlx::postgres::PgRow) -> RepositoryResult<SourcePeriod> {
    Ok(SourcePeriod {
        id: row.get("id"),
        source_id: row.get("source_id"),
        period: CandlePeriod::parse(row.get::<String, _>("period").as_str())?,
        start_from: row.get("start_from"),
        active: row.get("active"),
    })
}

fn feature_from_row(row: &sqlx::postgres::PgRow) -> Feature {
    Feature {
        id: row.get("id"),
        name: row.get("name"),
        connector: row.get("connector"),
        lookback: row.get("lookback"),
        schedule: row.get("schedule"),
        active: row.get("active"),
    }
}

fn feature_execution_from_row(row: &sqlx::postgres::PgRow) -> FeatureExecution {
    FeatureExecution {
        id: row.get("id"),
        feature_id: row.get("feature_id"),
        name: row.get("name"),
        active: row.get("active"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_status_conversion() {
        assert_eq!(BatchStatus::InProgress.as_str(), "in_progress");
        assert_eq!(BatchStatus::parse("complete"), Some(BatchStatus::Complete));
        assert_eq!(BatchStatus::parse("invalid"), None);
    }

    #[test]
    fn test_source_connection_params_validation() {
        let source = Source {
            id: 1,
            name: "broker".to_string(),
            connector: "mock".to_string(),
            connection_params: serde_json::json!({"host": "broker.example"}),
            active: true,
        };
        assert!(source.connection_params().is_ok());

        let bad = Source {
            connection_params: serde_json::json!([1, 2, 3]),
            ..source
        };
        assert!(bad.connection_params().is_err());
    }
}
