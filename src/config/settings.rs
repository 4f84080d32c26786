//! Application settings and configuration

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Database configuration
    pub database: DatabaseSettings,
    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,
    /// Scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Maximum rows per upsert statement
    #[serde(default = "default_batch_size")]
    pub batch_insert_size: usize,
    /// Maximum rows per summary-table upsert statement
    #[serde(default = "default_summary_batch_size")]
    pub summary_batch_size: usize,
}

fn default_batch_size() -> usize {
    1000
}

fn default_summary_batch_size() -> usize {
    100
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            batch_insert_size: default_batch_size(),
            summary_batch_size: default_summary_batch_size(),
        }
    }
}

/// Scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// How often the serve loop polls for due schedules, in seconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Schedule for the summary aggregation batch (e.g. "daily 02:30")
    #[serde(default = "default_summary_schedule")]
    pub summary_schedule: String,
}

fn default_tick_interval() -> u64 {
    1
}

fn default_summary_schedule() -> String {
    "daily 02:30".to_string()
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            summary_schedule: default_summary_schedule(),
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_prefix("MARKETDATA")
    }

    /// Load settings with a custom environment variable prefix
    pub fn load_with_prefix(env_prefix: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config_dir = Self::config_dir();

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
            // Add environment-specific configuration
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // Add local overrides (not checked into git)
            .add_source(File::with_name(&format!("{}/local", config_dir)).required(false))
            // Add environment variables (e.g. MARKETDATA__DATABASE__URL)
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    /// Get the configuration directory path
    fn config_dir() -> String {
        std::env::var("MARKETDATA_CONFIG_DIR").unwrap_or_else(|_| "config".into())
    }

    /// Create default settings (useful for testing)
    pub fn default_settings() -> Self {
        Settings {
            database: DatabaseSettings {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgresql://localhost/marketdata".into()),
                max_connections: 10,
                min_connections: 2,
            },
            storage: StorageSettings::default(),
            scheduler: SchedulerSettings::default(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::default_settings()
    }
}
