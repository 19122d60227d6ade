//! Common utilities for venue implementations.

use std::str::FromStr;

use rust_decimal::Decimal;

use super::ParseError;

/// Parses a decimal price string sent by a venue. Exponent notation
/// ("1e-5") is accepted.
pub fn parse_price(field: &'static str, raw: &str) -> Result<Decimal, ParseError> {
    let trimmed = raw.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| ParseError::InvalidPrice {
            field,
            value: raw.to_string(),
        })
}

/// Returns the price of the first `[price, quantity, ...]` level, if any.
pub fn first_level_price(field: &'static str, levels: &[Vec<String>]) -> Result<Option<Decimal>, ParseError> {
    match levels.first().and_then(|level| level.first()) {
        Some(price) => parse_price(field, price).map(Some),
        None => Ok(None),
    }
}
