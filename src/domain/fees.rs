//! Taker fee table.

use rust_decimal::Decimal;
use std::collections::HashMap;

/// FeeTable maps venue names to their taker fee.
///
/// Fees are expressed as decimals (e.g., 0.001 for 0.1%). The table is built
/// once at startup and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeeTable {
    taker: HashMap<String, Decimal>,
}

impl FeeTable {
    /// Creates an empty fee table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the table with `venue`'s taker fee set.
    pub fn with_taker(mut self, venue: impl Into<String>, fee: Decimal) -> Self {
        self.taker.insert(venue.into(), fee);
        self
    }

    /// Returns the taker fee for `venue`, or zero when the venue is unknown.
    pub fn taker(&self, venue: &str) -> Decimal {
        self.taker.get(venue).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.taker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taker.is_empty()
    }
}

impl FromIterator<(String, Decimal)> for FeeTable {
    fn from_iter<I: IntoIterator<Item = (String, Decimal)>>(iter: I) -> Self {
        Self {
            taker: iter.into_iter().collect(),
        }
    }
}
