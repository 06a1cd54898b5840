//! Configuration for [`TestStore`](crate::TestStore).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use unistore_runtime::config::{ConfigError, parse_var};

/// Environment variable overriding [`TestStoreConfig::receive_timeout_ms`]
pub const RECEIVE_TIMEOUT_VAR: &str = "UNISTORE_RECEIVE_TIMEOUT_MS";

/// Environment variable overriding [`TestStoreConfig::teardown_grace_ms`]
pub const TEARDOWN_GRACE_VAR: &str = "UNISTORE_TEARDOWN_GRACE_MS";

/// Timing knobs for the test harness
///
/// Slow CI machines can raise the defaults without touching test code by
/// setting `UNISTORE_RECEIVE_TIMEOUT_MS` and `UNISTORE_TEARDOWN_GRACE_MS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestStoreConfig {
    /// How long `receive` waits for an effect to produce an action
    pub receive_timeout_ms: u64,
    /// How long `finish` waits for already-finishing effects to stop
    pub teardown_grace_ms: u64,
}

impl TestStoreConfig {
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
        if let Some(timeout_ms) = parse_var(lookup, RECEIVE_TIMEOUT_VAR)? {
            self.receive_timeout_ms = timeout_ms;
        }
        if let Some(grace_ms) = parse_var(lookup, TEARDOWN_GRACE_VAR)? {
            self.teardown_grace_ms = grace_ms;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if `receive_timeout_ms` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.receive_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "receive_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the default `receive` timeout
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // u64 millis covers ~584 million years
    pub const fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the teardown grace window
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace_ms = grace.as_millis() as u64;
        self
    }

    /// Default `receive` timeout as a Duration
    #[must_use]
    pub const fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    /// Teardown grace window as a Duration
    #[must_use]
    pub const fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }
}

impl Default for TestStoreConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 1_000,
            teardown_grace_ms: 100,
        }
    }
}
