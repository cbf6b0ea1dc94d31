//! Engine configuration.
//!
//! Loaded from environment variables with fallback to defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use basket_db::DbConfig;

const DEFAULT_DB_PATH: &str = "./basket.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ORDER_PREFIX: &str = "ORD";
const DEFAULT_NOTIFICATION_BUFFER: usize = 256;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite database file (`BASKET_DB_PATH`)
    pub db_path: PathBuf,

    /// Pool size (`BASKET_DB_MAX_CONNECTIONS`)
    pub db_max_connections: u32,

    /// Prefix for order numbers, e.g. ORD-000042 (`BASKET_ORDER_PREFIX`)
    pub order_prefix: String,

    /// Capacity of the notification queue (`BASKET_NOTIFICATION_BUFFER`)
    pub notification_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            db_max_connections: DEFAULT_MAX_CONNECTIONS,
            order_prefix: DEFAULT_ORDER_PREFIX.to_string(),
            notification_buffer: DEFAULT_NOTIFICATION_BUFFER,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = EngineConfig {
            db_path: lookup("BASKET_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),

            db_max_connections: lookup("BASKET_DB_MAX_CONNECTIONS")
                .unwrap_or_else(|| DEFAULT_MAX_CONNECTIONS.to_string())
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("BASKET_DB_MAX_CONNECTIONS".to_string()))?,

            order_prefix: lookup("BASKET_ORDER_PREFIX")
                .map(|p| p.trim().to_uppercase())
                .unwrap_or_else(|| DEFAULT_ORDER_PREFIX.to_string()),

            notification_buffer: lookup("BASKET_NOTIFICATION_BUFFER")
                .unwrap_or_else(|| DEFAULT_NOTIFICATION_BUFFER.to_string())
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("BASKET_NOTIFICATION_BUFFER".to_string()))?,
        };

        if config.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("BASKET_DB_MAX_CONNECTIONS".to_string()));
        }
        if config.notification_buffer == 0 {
            return Err(ConfigError::InvalidValue("BASKET_NOTIFICATION_BUFFER".to_string()));
        }
        if config.order_prefix.is_empty() {
            return Err(ConfigError::MissingRequired("BASKET_ORDER_PREFIX".to_string()));
        }

        Ok(config)
    }

    /// Pool settings for [`basket_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.db_path.clone()).max_connections(self.db_max_connections)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
