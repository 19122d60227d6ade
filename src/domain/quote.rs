//! Top-of-book quote data structures.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::TradingPair;

/// QuoteSource records where a quote's prices came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSource {
    /// Parsed from a venue's streaming feed.
    Live,
    /// Produced by the synthetic demo feed.
    Simulated,
    /// Placeholder published when the venue could not be reached.
    Fallback,
}

impl std::fmt::Display for QuoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuoteSource::Live => write!(f, "live"),
            QuoteSource::Simulated => write!(f, "simulated"),
            QuoteSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// Quote is the latest best bid/ask of one venue for one trading pair.
///
/// `bid <= ask` is not enforced; a crossed book is stored as reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Venue name (e.g., "binance").
    pub venue: String,
    /// Venue-native symbol (e.g., "BTCUSDT", "XBT/USDT").
    pub symbol: String,
    /// Venue-agnostic pair this quote belongs to.
    pub pair: TradingPair,
    /// Best bid price.
    pub bid: Decimal,
    /// Best ask price.
    pub ask: Decimal,
    /// When the quote was received or generated.
    pub observed_at: DateTime<Utc>,
    pub source: QuoteSource,
}

impl Quote {
    /// Returns how old the quote is at `now`. Future timestamps count as zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.observed_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Returns true if the quote is older than `window` at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.age(now) > window
    }

    /// Returns true if the quote carries usable prices for detection.
    pub fn is_comparable(&self) -> bool {
        self.source != QuoteSource::Fallback
            && self.bid > Decimal::ZERO
            && self.ask > Decimal::ZERO
    }
}
