//! Shared table of the latest quote per venue.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::trace;

use crate::domain::{Quote, TradingPair};

/// QuoteStore holds the latest quote of every venue for every monitored pair.
///
/// A single reader/writer lock guards the whole table: feeds take the write
/// path in `put`, readers take the read path in `snapshot`. Nothing is awaited
/// while the lock is held.
#[derive(Debug, Default)]
pub struct QuoteStore {
    quotes: RwLock<HashMap<(String, TradingPair), Quote>>,
}

impl QuoteStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entry of `quote.venue` for `quote.pair`.
    pub async fn put(&self, quote: Quote) {
        trace!(venue = %quote.venue, pair = %quote.pair, bid = %quote.bid, ask = %quote.ask, "quote stored");
        let key = (quote.venue.clone(), quote.pair.clone());
        self.quotes.write().await.insert(key, quote);
    }

    /// Returns a point-in-time copy of all entries, sorted by pair then venue.
    ///
    /// The copy is taken under one read-lock acquisition, so a snapshot never
    /// mixes entries from before and after a concurrent write.
    pub async fn snapshot(&self) -> Vec<Quote> {
        let mut quotes: Vec<Quote> = {
            let guard = self.quotes.read().await;
            guard.values().cloned().collect()
        };

        quotes.sort_by(|a, b| a.pair.cmp(&b.pair).then_with(|| a.venue.cmp(&b.venue)));
        quotes
    }

    /// Returns the latest quote of `venue` for `pair`, if any.
    pub async fn get(&self, venue: &str, pair: &TradingPair) -> Option<Quote> {
        self.quotes
            .read()
            .await
            .get(&(venue.to_string(), pair.clone()))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.quotes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.quotes.read().await.is_empty()
    }
}
