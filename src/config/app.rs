//! Application-level configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Default time allowed for tasks to finish after shutdown is signalled.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Application-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Application name used in logs.
    pub name: String,
    /// Environment: "development", "staging", or "production".
    pub env: String,
    /// Logging verbosity: "debug", "info", "warn", "error".
    pub log_level: Option<String>,
    /// How long shutdown waits for running tasks before abandoning them (default: 5s).
    #[serde(default, with = "duration")]
    pub shutdown_grace: Duration,
}

impl AppConfig {
    /// Returns the configured shutdown grace period or the default.
    pub fn shutdown_grace(&self) -> Duration {
        if self.shutdown_grace.is_zero() {
            DEFAULT_SHUTDOWN_GRACE
        } else {
            self.shutdown_grace
        }
    }
}
