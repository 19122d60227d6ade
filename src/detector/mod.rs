//! Arbitrage detection over the shared quote store.

mod engine;
mod summary;

pub use engine::{evaluate, ArbitrageEngine, EngineConfig, Stats};
pub use summary::{HistorySummary, MarketSummary, PairMarket, PairSummary};

#[cfg(test)]
mod tests;
