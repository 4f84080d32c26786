//! Command-line interface
//!
//! Provides CLI commands for the market data manager.

pub mod db;
pub mod run;
pub mod serve;

use clap::{Parser, Subcommand};

/// Market data manager CLI
#[derive(Parser)]
#[command(name = "marketdata-manager")]
#[command(about = "Incremental market data ingestion and feature calculation")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the scheduling service
    Serve(serve::ServeArgs),
    /// Run one pipeline once
    #[command(subcommand)]
    Run(run::RunCommands),
    /// Database operations
    #[command(subcommand)]
    Db(db::DbCommands),
}
