//! Venue-agnostic trading pair.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// TradingPair identifies a market by its base and quote currencies.
///
/// Currency codes are stored uppercase. Venues format the pair into their own
/// native symbol (see `Venue::format_symbol`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    /// Creates a new pair, normalizing both codes to uppercase.
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for TradingPair {
    type Err = String;

    /// Parses "BASE/QUOTE" (e.g., "BTC/USDT").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("invalid pair {:?}: expected BASE/QUOTE", s))?;

        let base = base.trim();
        let quote = quote.trim();
        if base.is_empty() || quote.is_empty() || quote.contains('/') {
            return Err(format!("invalid pair {:?}: expected BASE/QUOTE", s));
        }

        Ok(Self::new(base, quote))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pair() {
        let pair: TradingPair = "btc/usdt".parse().unwrap();
        assert_eq!(pair.base, "BTC");
        assert_eq!(pair.quote, "USDT");
        assert_eq!(pair.to_string(), "BTC/USDT");
    }

    #[test]
    fn test_parse_pair_rejects_missing_slash() {
        assert!("BTCUSDT".parse::<TradingPair>().is_err());
    }

    #[test]
    fn test_parse_pair_rejects_empty_side() {
        assert!("BTC/".parse::<TradingPair>().is_err());
        assert!("/USDT".parse::<TradingPair>().is_err());
        assert!("A/B/C".parse::<TradingPair>().is_err());
    }
}
