//! Arbitrage detection configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Arbitrage detection settings.
///
/// Zero durations and missing values fall back to the detector defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArbitrageConfig {
    /// Minimum fee-adjusted profit to raise an opportunity (e.g., "0.001" for 0.1%).
    pub min_profit_threshold: Option<String>,
    /// Interval between detection cycles (default: 500ms).
    #[serde(default, with = "duration")]
    pub detection_interval: Duration,
    /// Interval between market summaries (default: 5s).
    #[serde(default, with = "duration")]
    pub summary_interval: Duration,
    /// Maximum quote age still eligible for comparison (default: 10s).
    #[serde(default, with = "duration")]
    pub stale_after: Duration,
    /// Number of recent opportunities retained for summaries (default: 100).
    pub history_size: Option<usize>,
}
