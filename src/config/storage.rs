//! Storage configuration.

use serde::Deserialize;

/// Default path of the opportunity log.
pub const DEFAULT_OPPORTUNITY_LOG: &str = "data/opportunities.csv";

/// Opportunity persistence settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Whether opportunities are appended to the CSV log.
    #[serde(default)]
    pub enabled: bool,
    /// Path to the CSV file (default: data/opportunities.csv).
    pub path: Option<String>,
}

impl StorageConfig {
    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or(DEFAULT_OPPORTUNITY_LOG)
    }
}
