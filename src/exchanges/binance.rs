//! Binance spot `bookTicker` stream.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use super::utils::parse_price;
use super::{Frame, ParseError, Venue};
use crate::domain::TradingPair;

const EXCHANGE_NAME: &str = "binance";

/// Binance public WebSocket URL.
const WEBSOCKET_URL: &str = "wss://stream.binance.com:9443/ws";

/// Binance venue.
#[derive(Debug, Clone)]
pub struct Binance {
    url: String,
}

impl Binance {
    pub fn new() -> Self {
        Self::with_url(WEBSOCKET_URL)
    }

    pub fn with_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }
}

impl Default for Binance {
    fn default() -> Self {
        Self::new()
    }
}

/// Book ticker update.
/// Format: {"u":400900217,"s":"BTCUSDT","b":"69000.10","B":"1.2","a":"69000.20","A":"0.4"}
#[derive(Debug, Deserialize)]
struct BookTicker {
    #[serde(rename = "s")]
    symbol: Option<String>,
    #[serde(rename = "b")]
    bid: Option<String>,
    #[serde(rename = "a")]
    ask: Option<String>,
}

impl Venue for Binance {
    fn name(&self) -> &str {
        EXCHANGE_NAME
    }

    fn url(&self) -> &str {
        &self.url
    }

    /// Converts "BTC/USDT" to "BTCUSDT".
    fn format_symbol(&self, pair: &TradingPair) -> String {
        format!("{}{}", pair.base, pair.quote)
    }

    /// Stream names are lowercase: `btcusdt@bookTicker`.
    fn subscribe_message(&self, symbol: &str) -> Value {
        json!({
            "method": "SUBSCRIBE",
            "params": [format!("{}@bookTicker", symbol.to_lowercase())],
            "id": 1
        })
    }

    fn parse(&self, raw: &str) -> Result<Frame, ParseError> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(map) = &value else {
            return Err(ParseError::UnexpectedShape("expected a json object".into()));
        };

        // {"result":null,"id":1} acknowledges the subscription.
        if map.contains_key("result") {
            return Ok(Frame::Ignored("subscription ack".into()));
        }
        if let Some(error) = map.get("error") {
            return Ok(Frame::Rejected(error.to_string()));
        }

        let ticker: BookTicker = serde_json::from_value(value)?;
        match (ticker.bid.as_deref(), ticker.ask.as_deref()) {
            (Some(bid), Some(ask)) if !bid.is_empty() && !ask.is_empty() => Ok(Frame::Ticker {
                bid: parse_price("bid", bid)?,
                ask: parse_price("ask", ask)?,
            }),
            _ => Ok(Frame::Ignored(format!(
                "incomplete ticker for {}",
                ticker.symbol.as_deref().unwrap_or("unknown symbol")
            ))),
        }
    }

    fn fallback_prices(&self) -> (Decimal, Decimal) {
        (Decimal::from(69500), Decimal::from(69550))
    }
}
