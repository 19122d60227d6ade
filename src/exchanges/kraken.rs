//! Kraken v1 public `ticker` channel.
//!
//! Control frames are JSON objects (`heartbeat`, `systemStatus`,
//! `subscriptionStatus`). Data frames are arrays:
//! `[channelID, {"a":[price,...],"b":[price,...],...}, "ticker", "XBT/USDT"]`.

use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use super::utils::parse_price;
use super::{Frame, ParseError, Venue};
use crate::domain::TradingPair;

const EXCHANGE_NAME: &str = "kraken";

/// Kraken public WebSocket URL.
const WEBSOCKET_URL: &str = "wss://ws.kraken.com";

const TICKER_CHANNEL: &str = "ticker";

/// Kraken venue.
#[derive(Debug, Clone)]
pub struct Kraken {
    url: String,
}

impl Kraken {
    pub fn new() -> Self {
        Self::with_url(WEBSOCKET_URL)
    }

    pub fn with_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }
}

impl Default for Kraken {
    fn default() -> Self {
        Self::new()
    }
}

/// Kraken names bitcoin XBT.
fn asset_code(asset: &str) -> &str {
    match asset {
        "BTC" => "XBT",
        other => other,
    }
}

impl Venue for Kraken {
    fn name(&self) -> &str {
        EXCHANGE_NAME
    }

    fn url(&self) -> &str {
        &self.url
    }

    /// Converts "BTC/USDT" to "XBT/USDT".
    fn format_symbol(&self, pair: &TradingPair) -> String {
        format!("{}/{}", asset_code(&pair.base), asset_code(&pair.quote))
    }

    fn subscribe_message(&self, symbol: &str) -> Value {
        json!({
            "event": "subscribe",
            "reqid": 1,
            "pair": [symbol],
            "subscription": {"name": TICKER_CHANNEL}
        })
    }

    fn parse(&self, raw: &str) -> Result<Frame, ParseError> {
        match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => Ok(parse_event(&map)),
            Value::Array(items) => parse_ticker(&items),
            _ => Err(ParseError::UnexpectedShape(
                "expected a json object or array".into(),
            )),
        }
    }

    fn fallback_prices(&self) -> (Decimal, Decimal) {
        (Decimal::from(69550), Decimal::from(69650))
    }
}

fn parse_event(map: &Map<String, Value>) -> Frame {
    let event = map.get("event").and_then(Value::as_str).unwrap_or("unknown");
    let status = map.get("status").and_then(Value::as_str);

    if event == "subscriptionStatus" && status == Some("error") {
        let message = map
            .get("errorMessage")
            .and_then(Value::as_str)
            .unwrap_or("subscription failed");
        return Frame::Rejected(message.to_string());
    }
    Frame::Ignored(event.to_string())
}

fn parse_ticker(items: &[Value]) -> Result<Frame, ParseError> {
    if items.len() < 4 {
        return Err(ParseError::UnexpectedShape(format!(
            "array frame with {} elements",
            items.len()
        )));
    }

    let channel = items[items.len() - 2].as_str().unwrap_or_default();
    if channel != TICKER_CHANNEL {
        return Ok(Frame::Ignored(format!("channel {}", channel)));
    }

    let payload = items[1]
        .as_object()
        .ok_or_else(|| ParseError::UnexpectedShape("ticker payload is not an object".into()))?;

    match (first_price(payload, "b", "bid")?, first_price(payload, "a", "ask")?) {
        (Some(bid), Some(ask)) => Ok(Frame::Ticker { bid, ask }),
        _ => Ok(Frame::Ignored("incomplete ticker".into())),
    }
}

/// Reads the price (first element) of a `[price, wholeLotVolume, lotVolume]` field.
fn first_price(
    payload: &Map<String, Value>,
    key: &str,
    field: &'static str,
) -> Result<Option<Decimal>, ParseError> {
    let Some(price) = payload
        .get(key)
        .and_then(Value::as_array)
        .and_then(|level| level.first())
    else {
        return Ok(None);
    };

    match price.as_str() {
        Some(raw) => parse_price(field, raw).map(Some),
        None => Err(ParseError::InvalidPrice {
            field,
            value: price.to_string(),
        }),
    }
}
