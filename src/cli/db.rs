//! Database management commands

use anyhow::Result;
use clap::Subcommand;
use std::sync::Arc;
use tracing::info;

use crate::config::Settings;
use crate::storage::{run_migrations, MarketDataRepository};

/// Database subcommands
#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
    /// Show candle table statistics
    Stats,
}

/// Execute a database command
pub async fn execute(command: DbCommands) -> Result<()> {
    let settings = Settings::load()?;
    let repository = Arc::new(
        MarketDataRepository::from_settings(
            &settings.database,
            settings.storage.batch_insert_size,
        )
        .await?,
    );

    match command {
        DbCommands::Migrate => {
            run_migrations(repository.pool()).await?;
        }
        DbCommands::Stats => {
            let stats = repository.candle_stats().await?;
            info!(
                "{} candles across {} source symbols",
                stats.total_candles, stats.source_symbols
            );
            match (stats.earliest_time, stats.latest_time) {
                (Some(earliest), Some(latest)) => {
                    info!("Coverage from {} to {}", earliest, latest)
                }
                _ => info!("No candle data stored yet"),
            }
        }
    }

    Ok(())
}
