//! Gateway configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Process-level gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Counterparty identifier used for symbology lookups
    pub counterparty: String,
    /// Default order-book price precision when the request carries none
    #[serde(default = "default_book_precision")]
    pub book_precision: String,
    /// Order-book depth requested from the exchange
    #[serde(default = "default_book_length")]
    pub book_length: u32,
    /// Bounded wait for the authentication handshake
    #[serde(default = "default_timeout_secs")]
    pub auth_timeout_secs: u64,
    /// Bounded wait for subscribe/unsubscribe round trips
    #[serde(default = "default_timeout_secs")]
    pub subscribe_timeout_secs: u64,
    /// Path to a flat symbology table; passthrough when absent
    #[serde(default)]
    pub symbology_path: Option<String>,
    /// Fall back to the untranslated symbol on table misses
    #[serde(default = "default_true")]
    pub symbology_passthrough: bool,
}

fn default_book_precision() -> String {
    "P0".to_string()
}

fn default_book_length() -> u32 {
    25
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            counterparty: "default".to_string(),
            book_precision: default_book_precision(),
            book_length: default_book_length(),
            auth_timeout_secs: default_timeout_secs(),
            subscribe_timeout_secs: default_timeout_secs(),
            symbology_path: None,
            symbology_passthrough: true,
        }
    }
}

impl GatewayConfig {
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_secs(self.subscribe_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.counterparty.is_empty() {
            return Err(ConfigError::Invalid("counterparty must be set".to_string()));
        }
        if self.auth_timeout_secs == 0 || self.subscribe_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load gateway configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<GatewayConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Load configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config = load_config_from_str(r#"{"counterparty": "acme"}"#).unwrap();
        assert_eq!(config.counterparty, "acme");
        assert_eq!(config.book_precision, "P0");
        assert_eq!(config.book_length, 25);
        assert_eq!(config.auth_timeout(), Duration::from_secs(5));
        assert!(config.symbology_passthrough);
    }

    #[test]
    fn test_validate_rejects_empty_counterparty() {
        assert!(load_config_from_str(r#"{"counterparty": ""}"#).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let result =
            load_config_from_str(r#"{"counterparty": "acme", "auth_timeout_secs": 0}"#);
        assert!(result.is_err());
    }
}
