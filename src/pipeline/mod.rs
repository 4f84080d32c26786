//! Ingestion and aggregation pipelines
//!
//! The pipeline entry points invoked by the scheduler: price retrieval per
//! source-period, symbol refresh per source, and the summary aggregation
//! batch. Each run is synchronous and independent; idempotent upserts make
//! overlapping runs safe without locking.

mod prices;
mod summary;
mod symbols;

pub use prices::*;
pub use summary::*;
pub use symbols::*;

use thiserror::Error;

use crate::connector::ConnectorError;
use crate::error::{ErrorCategory, ErrorClassification};
use crate::storage::{RepositoryError, UpsertError};

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Upsert(#[from] UpsertError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ErrorClassification for PipelineError {
    fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::Repository(e) => e.category(),
            PipelineError::Connector(e) => e.category(),
            PipelineError::Upsert(e) => e.category(),
            PipelineError::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
