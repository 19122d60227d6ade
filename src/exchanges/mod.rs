//! Venue integrations and the feeds that publish their quotes.
//!
//! A [`Venue`] describes one exchange's public stream: its URL, how it names a
//! trading pair, how to subscribe, and how to turn a raw frame into a
//! top-of-book [`Frame`]. A [`FeedSource`] is anything that keeps a venue's
//! quote fresh in the [`QuoteStore`]: the live [`Connector`] or the
//! [`SimulatedFeed`] used for demos.

mod binance;
mod connector;
mod kraken;
mod manager;
mod poloniex;
mod simulated;
mod utils;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::TradingPair;
use crate::market::QuoteStore;

pub use binance::Binance;
pub use connector::{Connector, ConnectorConfig};
pub use kraken::Kraken;
pub use manager::Manager;
pub use poloniex::Poloniex;
pub use simulated::{SimulatedFeed, SimulationParams};

/// Names accepted in the `exchanges` section of the configuration.
pub const SUPPORTED_VENUES: &[&str] = &["binance", "kraken", "poloniex"];

/// Returns true if `name` is a venue with a streaming integration.
pub fn is_supported(name: &str) -> bool {
    SUPPORTED_VENUES.contains(&name.to_lowercase().as_str())
}

/// Creates the venue integration for `name`, optionally overriding its stream URL.
pub fn create_venue(name: &str, url: Option<&str>) -> Result<Arc<dyn Venue>> {
    let venue: Arc<dyn Venue> = match name.to_lowercase().as_str() {
        "binance" => Arc::new(url.map_or_else(Binance::new, Binance::with_url)),
        "kraken" => Arc::new(url.map_or_else(Kraken::new, Kraken::with_url)),
        "poloniex" => Arc::new(url.map_or_else(Poloniex::new, Poloniex::with_url)),
        _ => return Err(FeedError::UnsupportedVenue(name.to_string())),
    };
    Ok(venue)
}

/// Feed errors.
#[derive(Debug, Error)]
pub enum FeedError {
    /// No integration exists for the venue.
    #[error("unsupported venue: {0}")]
    UnsupportedVenue(String),

    /// Feed settings could not be used.
    #[error("invalid feed settings: {0}")]
    InvalidSettings(String),

    /// Feed with the same id is already registered.
    #[error("feed {0} is already registered")]
    Duplicate(String),
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;

/// Errors produced while decoding a venue frame. Never fatal to a stream.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("invalid json: {0}")]
    Json(String),

    #[error("unexpected message shape: {0}")]
    UnexpectedShape(String),

    #[error("invalid {field} price {value:?}")]
    InvalidPrice { field: &'static str, value: String },
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        ParseError::Json(e.to_string())
    }
}

/// Frame is the venue-independent meaning of one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// New best bid and ask.
    Ticker { bid: Decimal, ask: Decimal },
    /// Heartbeat, acknowledgement, status or other frame without prices.
    Ignored(String),
    /// The venue rejected the subscription. Logged, not fatal.
    Rejected(String),
}

/// Venue describes one exchange's public top-of-book stream.
///
/// Parsing is pure: it sees only the raw text and never touches shared state.
pub trait Venue: Send + Sync {
    /// Unique lowercase venue name (e.g., "binance").
    fn name(&self) -> &str;

    /// Public WebSocket URL.
    fn url(&self) -> &str;

    /// Formats a pair into the venue's native symbol.
    fn format_symbol(&self, pair: &TradingPair) -> String;

    /// Builds the subscription request for `symbol`.
    fn subscribe_message(&self, symbol: &str) -> serde_json::Value;

    /// Keep-alive message sent every ping interval, for venues that need one.
    fn ping_message(&self) -> Option<serde_json::Value> {
        None
    }

    /// Decodes one text frame.
    fn parse(&self, raw: &str) -> std::result::Result<Frame, ParseError>;

    /// Placeholder bid/ask published when the venue cannot be reached.
    fn fallback_prices(&self) -> (Decimal, Decimal);
}

/// Lifecycle state of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Disconnected,
    Connecting,
    Subscribed,
    Streaming,
    Reconnecting,
    Closed,
}

impl std::fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectorState::Disconnected => "disconnected",
            ConnectorState::Connecting => "connecting",
            ConnectorState::Subscribed => "subscribed",
            ConnectorState::Streaming => "streaming",
            ConnectorState::Reconnecting => "reconnecting",
            ConnectorState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Why a feed's `run` returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedExit {
    /// The shutdown signal was received.
    Shutdown,
    /// The venue closed the connection normally.
    ClosedByPeer,
    /// The transport could not be opened; a fallback quote was published.
    ConnectFailed(String),
}

/// FeedSource keeps one venue's quote for one pair up to date in the store.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Venue name the feed publishes under.
    fn venue(&self) -> &str;

    /// Pair the feed publishes.
    fn pair(&self) -> &TradingPair;

    /// Unique feed id, "venue:BASE/QUOTE".
    fn id(&self) -> String {
        format!("{}:{}", self.venue(), self.pair())
    }

    /// Current lifecycle state.
    fn state(&self) -> ConnectorState;

    /// Delay the supervisor waits before running the feed again.
    fn retry_delay(&self) -> Duration;

    /// Runs until shutdown, a clean close, or a failed connect.
    async fn run(&self, store: Arc<QuoteStore>, shutdown: &mut broadcast::Receiver<()>) -> FeedExit;
}
