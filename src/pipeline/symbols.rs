//! Symbol refresh pipeline
//!
//! Synchronizes the symbol table and source-symbol links with what a source
//! connector currently lists.

use std::sync::Arc;
use tracing::{debug, info};

use crate::connector::ConnectorRegistry;
use crate::storage::MarketDataRepository;

use super::{PipelineError, PipelineResult};

/// Result of one symbol refresh run
#[derive(Debug, Clone, Default)]
pub struct SymbolRefreshReport {
    pub source_id: i64,
    /// Symbols listed by the connector
    pub listed: usize,
    /// Source-symbol links created or refreshed
    pub linked: usize,
}

/// Symbol refresh pipeline
pub struct SymbolRefresher {
    repository: Arc<MarketDataRepository>,
    registry: Arc<ConnectorRegistry>,
}

impl SymbolRefresher {
    pub fn new(repository: Arc<MarketDataRepository>, registry: Arc<ConnectorRegistry>) -> Self {
        Self {
            repository,
            registry,
        }
    }

    /// Refresh the symbol universe for one source.
    ///
    /// New symbols are created with the listed instrument class; existing
    /// symbols keep theirs. Existing links keep their retrieval flag but have
    /// their provider metadata refreshed.
    pub async fn run(&self, source_id: i64) -> PipelineResult<SymbolRefreshReport> {
        let mut report = SymbolRefreshReport {
            source_id,
            ..Default::default()
        };

        let source = self.repository.get_source(source_id).await?;
        if !source.active {
            debug!("Source {} is inactive, skipping symbol refresh", source.name);
            return Ok(report);
        }

        let params = source
            .connection_params()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        let connector = self.registry.source(&source.connector, &params)?;

        let listings = connector.get_symbols().await?;
        report.listed = listings.len();

        for listing in listings {
            let symbol_id = self
                .repository
                .ensure_symbol(&listing.name, listing.instrument_type)
                .await?;

            let info = serde_json::Value::Object(listing.info);
            self.repository
                .ensure_source_symbol(source.id, symbol_id, &info)
                .await?;
            report.linked += 1;
        }

        info!(
            "Symbol refresh for {}: {} listed, {} linked",
            source.name, report.listed, report.linked
        );

        Ok(report)
    }
}
