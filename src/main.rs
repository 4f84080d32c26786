//! Market Data Manager CLI
//!
//! Provides commands for:
//! - `serve`: Start the scheduling service
//! - `run`: Run one pipeline once
//! - `db`: Database operations

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use marketdata_manager::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("marketdata_manager=info".parse()?))
        .init();

    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Execute command
    match cli.command {
        Commands::Serve(args) => {
            marketdata_manager::cli::serve::execute(args).await?;
        }
        Commands::Run(command) => {
            marketdata_manager::cli::run::execute(command).await?;
        }
        Commands::Db(command) => {
            marketdata_manager::cli::db::execute(command).await?;
        }
    }

    Ok(())
}
