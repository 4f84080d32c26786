//! # Market Data Manager
//!
//! Incremental ingestion of OHLC candle data from pluggable source
//! connectors, feature calculation over the stored candles, and coverage
//! summaries for data-quality reporting.
//!
//! ## Architecture
//!
//! Two ingestion pipelines share one pattern: periodically pull new data
//! points past a watermark into a Postgres table, relying on an idempotent
//! bulk upsert to tolerate overlapping or resampled records. Price retrieval
//! watermarks on the latest stored candle per symbol; feature calculation
//! watermarks on the earliest timestamp where every configured input has
//! aligned candle data and no result exists yet. A summary batch recomputes
//! per-bucket coverage statistics for the dashboards.
//!
//! Connectors are resolved through a registry built at process start; work
//! units are driven by an in-process scheduler reconciled from the persisted
//! configuration.

pub mod cli;
pub mod config;
pub mod connector;
pub mod error;
pub mod feature;
pub mod pipeline;
pub mod scheduler;
pub mod schema;
pub mod storage;

// Re-export commonly used types
pub use config::{ConnectionParams, Settings};
pub use connector::{
    ConnectorError, ConnectorRegistry, ConnectorResult, FeatureConnector, SourceConnector,
};
pub use error::{ErrorCategory, ErrorClassification};
pub use feature::{FeatureRunner, WatermarkResolver};
pub use pipeline::{PriceRetriever, SummaryAggregator, SymbolRefresher};
pub use schema::{CandleBar, CandlePeriod, InstrumentType, SymbolListing};
pub use storage::{bulk_upsert, Dataset, MarketDataRepository, Value};
