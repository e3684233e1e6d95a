//! Configuration management.

use serde::Deserialize;
use std::time::Duration;

use crate::error::Result;
use crate::telemetry::LoggingConfig;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Attendance store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Snapshot refresh configuration
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Reconciliation configuration
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Which persistence backend serves the roster and ledger.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store; suitable for a single station and for tests
    #[default]
    Memory,
    /// Shared PostgreSQL store for multiple scanning stations
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Backend selection
    #[serde(default)]
    pub backend: StoreBackend,

    /// PostgreSQL connection URL (required for the postgres backend)
    pub database_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Interval between automatic snapshot refreshes
    #[serde(default = "default_refresh_interval", with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: default_refresh_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconcileConfig {
    /// Repair roster/ledger divergence before every refresh
    #[serde(default)]
    pub heal_on_refresh: bool,
}

// Default value functions
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_refresh_interval() -> Duration { Duration::from_secs(30) }

impl Config {
    /// Load configuration from the environment (and `.env`, if present).
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("ROLLCALL").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("ROLLCALL").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject combinations that cannot start.
    pub fn validate(&self) -> Result<()> {
        if self.store.backend == StoreBackend::Postgres && self.store.database_url.is_none() {
            return Err(crate::error::RollcallError::configuration(
                "store.database_url is required for the postgres backend",
            ));
        }
        if self.store.min_connections > self.store.max_connections {
            return Err(crate::error::RollcallError::configuration(
                "store.min_connections exceeds store.max_connections",
            ));
        }
        if self.refresh.interval.is_zero() {
            return Err(crate::error::RollcallError::configuration(
                "refresh.interval must be greater than zero",
            ));
        }
        Ok(())
    }
}
