//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use bracket_engine::config::parse_env_or;
use bracket_engine::{ConfigError, DatabaseConfig, EngineConfig};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default HTTP bind address
pub const DEFAULT_BIND: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 6969);

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Bracket engine tuning
    pub engine: EngineConfig,
    /// Round scheduler configuration
    pub scheduler: SchedulerConfig,
    /// Prometheus scrape endpoint, disabled when unset
    pub metrics_bind: Option<SocketAddr>,
}

/// Periodic round-closure configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Whether the scheduler task runs at all
    pub enabled: bool,
    /// Seconds between sweeps over active tournaments
    pub interval_secs: u64,
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_addr("SERVER_BIND")?.unwrap_or(DEFAULT_BIND),
        };

        // A URL given on the command line stands in for DATABASE_URL
        let database = match (DatabaseConfig::from_env(), database_url_override) {
            (Ok(database), None) => database,
            (Ok(database), Some(url)) => DatabaseConfig {
                database_url: url,
                ..database
            },
            (Err(ConfigError::MissingRequired { .. }), Some(url)) => DatabaseConfig {
                database_url: url,
                ..DatabaseConfig::development()
            },
            (Err(e), _) => return Err(e),
        };

        let config = Self {
            bind,
            database,
            engine: EngineConfig::from_env()?,
            scheduler: SchedulerConfig {
                enabled: parse_env_or("SCHEDULER_ENABLED", true),
                interval_secs: parse_env_or("SCHEDULER_INTERVAL_SECS", 300),
            },
            metrics_bind: parse_addr("METRICS_BIND")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.engine.validate()?;

        if self.scheduler.enabled && self.scheduler.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "SCHEDULER_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0 when the scheduler is enabled".to_string(),
            });
        }

        if self.metrics_bind == Some(self.bind) {
            return Err(ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: "Must differ from SERVER_BIND".to_string(),
            });
        }

        Ok(())
    }
}

/// Read an optional socket address, rejecting malformed values
fn parse_addr(var: &str) -> Result<Option<SocketAddr>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value.parse().map(Some).map_err(|e| ConfigError::Invalid {
            var: var.to_string(),
            reason: format!("{e}"),
        }),
        Err(_) => Ok(None),
    }
}
