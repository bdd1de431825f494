//! Database settings loaded from the environment
//!
//! Settings come from environment variables prefixed with `LEDGER_DB_`
//! (e.g. `LEDGER_DB_URL`, `LEDGER_DB_MAX_CONNECTIONS`), with a `.env` file
//! honored in development.

use config::{Config, Environment};
use serde::Deserialize;
use std::time::Duration;

use crate::error::DatabaseError;
use crate::pool::DatabaseConfig;

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

/// Database settings as read from the environment
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl DatabaseSettings {
    /// Loads settings from the environment, reading `.env` first if present
    pub fn from_env() -> Result<Self, DatabaseError> {
        dotenvy::dotenv().ok();

        let settings = Config::builder()
            .add_source(Environment::with_prefix("LEDGER_DB"))
            .build()
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))
    }

    /// The pool configuration implied by these settings
    pub fn pool_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(&self.url)
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_carries_settings() {
        let settings = DatabaseSettings {
            url: "postgres://localhost/ledger_test".to_string(),
            max_connections: 7,
            min_connections: 1,
            connect_timeout_secs: 5,
        };
        let config = settings.pool_config();

        assert_eq!(config.url, "postgres://localhost/ledger_test");
        assert_eq!(config.max_connections, 7);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }
}
