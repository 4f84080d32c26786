//! Run command — execute one pipeline once
//!
//! One-shot invocations of the pipeline entry points, mostly for operations
//! and debugging. The scheduled service runs the same code paths.

use anyhow::Result;
use clap::{Args, Subcommand};
use std::sync::Arc;
use tracing::info;

use crate::config::Settings;
use crate::connector::ConnectorRegistry;
use crate::feature::FeatureRunner;
use crate::pipeline::{PriceRetriever, SummaryAggregator, SymbolRefresher};
use crate::storage::MarketDataRepository;

/// One-shot pipeline commands
#[derive(Subcommand)]
pub enum RunCommands {
    /// Retrieve prices for one source-period configuration
    Prices(PricesArgs),
    /// Refresh the symbol universe for one source
    Symbols(SymbolsArgs),
    /// Calculate one feature execution
    Feature(FeatureArgs),
    /// Run a summary aggregation batch
    Summary,
}

/// Arguments for the prices command
#[derive(Args)]
pub struct PricesArgs {
    /// Source-period id to retrieve for
    #[arg(long)]
    pub source_period: i64,
}

/// Arguments for the symbols command
#[derive(Args)]
pub struct SymbolsArgs {
    /// Source id to refresh
    #[arg(long)]
    pub source: i64,
}

/// Arguments for the feature command
#[derive(Args)]
pub struct FeatureArgs {
    /// Feature execution id to calculate
    #[arg(long)]
    pub execution: i64,
}

/// Execute a run command
pub async fn execute(command: RunCommands) -> Result<()> {
    let settings = Settings::load()?;
    let repository = Arc::new(
        MarketDataRepository::from_settings(
            &settings.database,
            settings.storage.batch_insert_size,
        )
        .await?,
    );
    let registry = Arc::new(ConnectorRegistry::with_builtins());

    match command {
        RunCommands::Prices(args) => {
            let report = PriceRetriever::new(repository, registry)
                .run(args.source_period)
                .await?;
            info!(
                "Retrieved {} rows ({} upserted, {} symbols skipped)",
                report.total_fetched(),
                report.total_upserted(),
                report.skipped()
            );
        }
        RunCommands::Symbols(args) => {
            let report = SymbolRefresher::new(repository, registry)
                .run(args.source)
                .await?;
            info!("Listed {} symbols, {} linked", report.listed, report.linked);
        }
        RunCommands::Feature(args) => {
            let report = FeatureRunner::new(repository, registry)
                .run(args.execution)
                .await?;
            match report.from_date {
                Some(from) => info!(
                    "Calculated from {}: {} results written",
                    from, report.results_written
                ),
                None => info!("Nothing to calculate"),
            }
        }
        RunCommands::Summary => {
            let report = SummaryAggregator::new(repository, settings.storage.summary_batch_size)
                .run()
                .await?;
            info!(
                "Summary batch {}: {} metric rows, {} aggregation rows",
                report.batch_id, report.metric_rows, report.aggregation_rows
            );
        }
    }

    Ok(())
}
