//! Poloniex public `book` channel (depth 5).

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use super::utils::first_level_price;
use super::{Frame, ParseError, Venue};
use crate::domain::TradingPair;

const EXCHANGE_NAME: &str = "poloniex";

/// Poloniex WebSocket URL.
const WEBSOCKET_URL: &str = "wss://ws.poloniex.com/ws/public";

/// Smallest depth Poloniex accepts. Only the top level is used.
const BOOK_DEPTH: u8 = 5;

/// Poloniex venue.
#[derive(Debug, Clone)]
pub struct Poloniex {
    url: String,
}

impl Poloniex {
    pub fn new() -> Self {
        Self::with_url(WEBSOCKET_URL)
    }

    pub fn with_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }
}

impl Default for Poloniex {
    fn default() -> Self {
        Self::new()
    }
}

/// Poloniex WebSocket message.
/// Format: {"channel":"book","data":[{"symbol":"BTC_USDT","asks":[["69001","0.5"]],"bids":[["69000","1.2"]],"ts":123}]}
#[derive(Debug, Deserialize)]
struct BookMessage {
    channel: Option<String>,
    event: Option<String>,
    message: Option<String>,
    #[serde(default)]
    data: Vec<BookData>,
}

#[derive(Debug, Deserialize)]
struct BookData {
    symbol: Option<String>,
    #[serde(default)]
    asks: Vec<Vec<String>>,
    #[serde(default)]
    bids: Vec<Vec<String>>,
}

impl Venue for Poloniex {
    fn name(&self) -> &str {
        EXCHANGE_NAME
    }

    fn url(&self) -> &str {
        &self.url
    }

    /// Converts "BTC/USDT" to "BTC_USDT".
    fn format_symbol(&self, pair: &TradingPair) -> String {
        format!("{}_{}", pair.base, pair.quote)
    }

    fn subscribe_message(&self, symbol: &str) -> Value {
        json!({
            "event": "subscribe",
            "channel": ["book"],
            "symbols": [symbol],
            "depth": BOOK_DEPTH
        })
    }

    /// Poloniex drops connections without traffic for 30 seconds.
    fn ping_message(&self) -> Option<Value> {
        Some(json!({"event": "ping"}))
    }

    fn parse(&self, raw: &str) -> Result<Frame, ParseError> {
        let msg: BookMessage = serde_json::from_str(raw)?;

        // Control frames: subscribe confirmation, pong, error.
        if let Some(event) = msg.event.as_deref() {
            if event == "error" {
                let reason = msg.message.unwrap_or_else(|| "subscription failed".into());
                return Ok(Frame::Rejected(reason));
            }
            return Ok(Frame::Ignored(event.to_string()));
        }

        if msg.channel.as_deref() != Some("book") {
            return Ok(Frame::Ignored(format!(
                "channel {}",
                msg.channel.as_deref().unwrap_or("unknown")
            )));
        }

        let Some(book) = msg.data.first() else {
            return Ok(Frame::Ignored("empty book message".into()));
        };

        match (
            first_level_price("bid", &book.bids)?,
            first_level_price("ask", &book.asks)?,
        ) {
            (Some(bid), Some(ask)) => Ok(Frame::Ticker { bid, ask }),
            _ => Ok(Frame::Ignored(format!(
                "empty book side for {}",
                book.symbol.as_deref().unwrap_or("unknown symbol")
            ))),
        }
    }

    fn fallback_prices(&self) -> (Decimal, Decimal) {
        (Decimal::from(69520), Decimal::from(69600))
    }
}
