//! Exchange configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Where a venue's quotes come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    /// Streaming connection to the venue.
    #[default]
    Live,
    /// Synthetic quotes from the demo generator.
    Simulated,
}

/// Settings for a single exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Whether this exchange should be monitored.
    #[serde(default)]
    pub enabled: bool,
    /// Taker fee as a decimal string (e.g., "0.001" for 0.1%).
    pub fee_taker: Option<String>,
    /// Quote source for this exchange (default: live).
    #[serde(default)]
    pub source: FeedKind,
    /// WebSocket connection settings.
    pub websocket: Option<WebSocketConfig>,
}

/// WebSocket connection settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebSocketConfig {
    /// Overrides the venue's public stream URL.
    pub url: Option<String>,
    /// Interval between keep-alive pings, for venues that need them.
    #[serde(default, with = "duration")]
    pub ping_interval: Duration,
    /// Delay before attempting to reconnect after disconnection.
    #[serde(default, with = "duration")]
    pub reconnect_delay: Duration,
}
