//! Domain models for quotes, fees and arbitrage opportunities.

mod fees;
mod opportunity;
mod pair;
mod quote;

pub use fees::FeeTable;
pub use opportunity::OpportunityEvent;
pub use pair::TradingPair;
pub use quote::{Quote, QuoteSource};
