//! Configuration for Store instances.
//!
//! Values come from three layers, lowest precedence first: compiled-in
//! defaults, a serialized document (any `serde` format), and `UNISTORE_*`
//! environment variables.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use unistore_runtime::StoreConfig;
//!
//! let config = StoreConfig::default()
//!     .with_broadcast_capacity(64)
//!     .with_shutdown_timeout(Duration::from_secs(5));
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding [`StoreConfig::broadcast_capacity`]
pub const BROADCAST_CAPACITY_VAR: &str = "UNISTORE_BROADCAST_CAPACITY";

/// Environment variable overriding [`StoreConfig::shutdown_timeout_ms`]
pub const SHUTDOWN_TIMEOUT_VAR: &str = "UNISTORE_SHUTDOWN_TIMEOUT_MS";

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held a value that does not parse
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue {
        /// Variable name
        var: String,
        /// Raw value found
        value: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Look up `var` through `lookup` and parse it.
///
/// Returns `Ok(None)` when the variable is unset.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] if the value is present but does
/// not parse as `T`.
pub fn parse_var<T, L>(lookup: &L, var: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    L: Fn(&str) -> Option<String> + ?Sized,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value: raw,
            }),
    }
}

/// Configuration for Store instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Capacity of the effect-produced action broadcast channel
    pub broadcast_capacity: usize,
    /// Default timeout for graceful shutdown, in milliseconds
    pub shutdown_timeout_ms: u64,
}

impl StoreConfig {
    /// Load the defaults, overridden by `UNISTORE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable does not parse or the result fails
    /// [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_env(&|var| std::env::var(var).ok())
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable does not parse or the result fails
    /// [`validate`](Self::validate).
    pub fn merge_env<L>(mut self, lookup: &L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String> + ?Sized,
    {
        if let Some(capacity) = parse_var(lookup, BROADCAST_CAPACITY_VAR)? {
            self.broadcast_capacity = capacity;
        }
        if let Some(timeout_ms) = parse_var(lookup, SHUTDOWN_TIMEOUT_VAR)? {
            self.shutdown_timeout_ms = timeout_ms;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast_capacity == 0 {
            return Err(ConfigError::Validation(
                "broadcast_capacity must be > 0".to_string(),
            ));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "shutdown_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the broadcast channel capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // u64 millis covers ~584 million years
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Get the shutdown timeout as a Duration
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 16,
            shutdown_timeout_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_store_config_default() {
        let config = StoreConfig::default();
        assert_eq!(config.broadcast_capacity, 16);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_store_config_builder_pattern() {
        let config = StoreConfig::default()
            .with_broadcast_capacity(128)
            .with_shutdown_timeout(Duration::from_secs(60));

        assert_eq!(config.broadcast_capacity, 128);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_env_overrides_defaults() -> Result<(), ConfigError> {
        let config = StoreConfig::default().merge_env(&env(&[
            (BROADCAST_CAPACITY_VAR, "256"),
            (SHUTDOWN_TIMEOUT_VAR, " 1500 "),
        ]))?;

        assert_eq!(config.broadcast_capacity, 256);
        assert_eq!(config.shutdown_timeout(), Duration::from_millis(1500));
        Ok(())
    }

    #[test]
    fn test_unset_env_keeps_defaults() -> Result<(), ConfigError> {
        let config = StoreConfig::default().merge_env(&env(&[]))?;
        assert_eq!(config, StoreConfig::default());
        Ok(())
    }

    #[test]
    fn test_unparseable_env_is_reported() {
        let result = StoreConfig::default().merge_env(&env(&[(BROADCAST_CAPACITY_VAR, "lots")]));
        assert_eq!(
            result,
            Err(ConfigError::InvalidValue {
                var: BROADCAST_CAPACITY_VAR.to_string(),
                value: "lots".to_string(),
            })
        );
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let result = StoreConfig::default()
            .with_broadcast_capacity(0)
            .validate();
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_partial_document_uses_defaults() -> Result<(), serde_json::Error> {
        let config: StoreConfig = serde_json::from_str(r#"{ "broadcast_capacity": 4 }"#)?;
        assert_eq!(config.broadcast_capacity, 4);
        assert_eq!(config.shutdown_timeout_ms, 30_000);
        Ok(())
    }
}
