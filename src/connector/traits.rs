//! Connector trait definitions
//!
//! These traits define the interface between the pipelines and external data
//! providers / feature implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::error::{ErrorCategory, ErrorClassification};
use crate::schema::{CandleBar, CandlePeriod, SymbolListing};

/// Connector error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConnectorError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Data not available: {0}")]
    DataNotAvailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ErrorClassification for ConnectorError {
    fn category(&self) -> ErrorCategory {
        match self {
            ConnectorError::Connection(_) => ErrorCategory::Transient,
            ConnectorError::Authentication(_) => ErrorCategory::Configuration,
            ConnectorError::Request(_) => ErrorCategory::Transient,
            ConnectorError::Parse(_) => ErrorCategory::Permanent,
            ConnectorError::RateLimit(_) => ErrorCategory::ResourceExhausted,
            ConnectorError::SymbolNotFound(_) => ErrorCategory::Permanent,
            ConnectorError::DataNotAvailable(_) => ErrorCategory::Permanent,
            ConnectorError::Configuration(_) => ErrorCategory::Configuration,
            ConnectorError::Internal(_) => ErrorCategory::Internal,
        }
    }

    fn suggested_retry_delay(&self) -> Option<std::time::Duration> {
        match self {
            ConnectorError::Connection(_) => Some(std::time::Duration::from_secs(2)),
            ConnectorError::Request(_) => Some(std::time::Duration::from_millis(500)),
            ConnectorError::RateLimit(_) => Some(std::time::Duration::from_secs(60)),
            _ => None,
        }
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Interface to an external price data source.
///
/// One instance is constructed per source record, carrying that source's
/// validated connection parameters.
#[async_trait]
pub trait SourceConnector: Send + Sync + std::fmt::Debug {
    /// Connector name as registered (e.g. "mock")
    fn name(&self) -> &str;

    /// List the symbols available from this source
    async fn get_symbols(&self) -> ConnectorResult<Vec<SymbolListing>>;

    /// Fetch candle data for one symbol over `[from, to]`.
    ///
    /// `symbol_info` is the provider-specific metadata stored on the
    /// source-symbol link (tick size, digits, …). Implementations raise
    /// [`ConnectorError::DataNotAvailable`] for ranges they cannot serve.
    async fn get_prices(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        period: CandlePeriod,
        symbol_info: &serde_json::Value,
    ) -> ConnectorResult<Vec<CandleBar>>;
}

/// One row of the input frame handed to a feature connector: a candle,
/// left-joined to any result already computed at its timestamp.
#[derive(Debug, Clone)]
pub struct InputRow {
    pub time: DateTime<Utc>,
    pub bar: CandleBar,
    /// Existing result at this timestamp, if one was already computed
    pub result: Option<Decimal>,
}

/// The candle data for one feature-execution input, from the resolved
/// calculation window onward.
#[derive(Debug, Clone)]
pub struct InputFrame {
    pub source_symbol_id: i64,
    pub period: CandlePeriod,
    pub rows: Vec<InputRow>,
}

impl InputFrame {
    /// Timestamps that do not yet carry a result
    pub fn uncalculated_times(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.rows
            .iter()
            .filter(|r| r.result.is_none())
            .map(|r| r.time)
    }
}

/// One computed feature value
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPoint {
    pub time: DateTime<Utc>,
    pub result: Decimal,
}

/// Interface to a feature calculation.
///
/// The runner resolves the calculation window, fetches one [`InputFrame`] per
/// configured input, and persists whatever points the connector returns.
/// Rows that already carry a result are present for lookback context and
/// must not be re-emitted.
#[async_trait]
pub trait FeatureConnector: Send + Sync + std::fmt::Debug {
    /// Connector name as registered (e.g. "moving_average")
    fn name(&self) -> &str;

    /// Compute result points from the input frames.
    ///
    /// `lookback` is the feature's configured lookback window.
    async fn execute(
        &self,
        lookback: chrono::Duration,
        inputs: &[InputFrame],
    ) -> ConnectorResult<Vec<ResultPoint>>;
}
