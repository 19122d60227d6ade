//! Synthetic feed configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Settings for venues configured with `source: simulated`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulationConfig {
    /// Centre price the synthetic quotes move around (e.g., "70000").
    pub base_price: Option<String>,
    /// Maximum distance of the mid price from the base price.
    pub max_drift: Option<String>,
    /// Maximum half-spread applied around the mid price.
    pub spread: Option<String>,
    /// Probability that a tick produces a deliberately dislocated quote.
    pub dislocation_probability: Option<f64>,
    /// Interval between generated quotes (default: 500ms).
    #[serde(default, with = "duration")]
    pub tick_interval: Duration,
}
