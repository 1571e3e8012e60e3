use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::LedgerError;

/// Ledger runtime configuration.
///
/// Sources, lowest precedence first: built-in defaults, an optional TOML
/// file, then `LEDGER_*` environment variables (`LEDGER_DATABASE_URL`,
/// `LEDGER_MAX_APPEND_ATTEMPTS`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
    pub max_append_attempts: u32,
    pub lock_timeout_ms: u64,
    pub retry_backoff_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://compliance-ledger.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5_000,
            max_append_attempts: 8,
            lock_timeout_ms: 2_000,
            retry_backoff_ms: 5,
        }
    }
}

impl LedgerConfig {
    /// Load from defaults and environment only
    pub fn load() -> Result<Self, LedgerError> {
        Self::load_from(None)
    }

    /// Load with an optional TOML file layered between defaults and environment
    pub fn load_from(path: Option<&Path>) -> Result<Self, LedgerError> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("database_url", defaults.database_url.clone())?
            .set_default("max_connections", defaults.max_connections as i64)?
            .set_default("busy_timeout_ms", defaults.busy_timeout_ms as i64)?
            .set_default("max_append_attempts", defaults.max_append_attempts as i64)?
            .set_default("lock_timeout_ms", defaults.lock_timeout_ms as i64)?
            .set_default("retry_backoff_ms", defaults.retry_backoff_ms as i64)?;

        if let Some(path) = path {
            if !path.exists() {
                return Err(LedgerError::Config(format!(
                    "Configuration file not found: {:?}",
                    path
                )));
            }
            builder = builder.add_source(
                config::File::from(path.to_path_buf()).format(config::FileFormat::Toml),
            );
        }

        let config: Self = builder
            .add_source(config::Environment::with_prefix("LEDGER").try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the appender cannot work with
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.database_url.trim().is_empty() {
            return Err(LedgerError::Config("database_url must not be empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(LedgerError::Config("max_connections must be at least 1".to_string()));
        }
        if self.max_append_attempts == 0 {
            return Err(LedgerError::Config(
                "max_append_attempts must be at least 1".to_string(),
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(LedgerError::Config("lock_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, LedgerError> {
        toml::to_string_pretty(self)
            .map_err(|e| LedgerError::Config(format!("Failed to render configuration: {}", e)))
    }
}
