//! Arbitrage opportunity domain model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TradingPair;

/// OpportunityEvent represents a detected cross-venue arbitrage opportunity.
///
/// One event is raised per profitable direction per detection cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityEvent {
    /// When this opportunity was detected.
    pub detected_at: DateTime<Utc>,
    /// Base currency of the pair (e.g., "BTC").
    pub base: String,
    /// Quote currency of the pair (e.g., "USDT").
    pub quote: String,
    /// Venue where to buy.
    pub buy_venue: String,
    /// Venue where to sell.
    pub sell_venue: String,
    /// Ask price on the buy venue, before fees.
    pub buy_price: Decimal,
    /// Bid price on the sell venue, before fees.
    pub sell_price: Decimal,
    /// Fee-adjusted profit as a percentage of the effective buy price.
    pub profit_percent: Decimal,
    /// Effective sell price minus effective buy price, per unit of base.
    pub net_profit: Decimal,
}

impl OpportunityEvent {
    /// Returns the trading pair of this opportunity.
    pub fn pair(&self) -> TradingPair {
        TradingPair::new(self.base.clone(), self.quote.clone())
    }
}

impl std::fmt::Display for OpportunityEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} buy {} @ {} -> sell {} @ {} ({:.4}%)",
            self.base,
            self.quote,
            self.buy_venue,
            self.buy_price,
            self.sell_venue,
            self.sell_price,
            self.profit_percent.round_dp(4)
        )
    }
}
