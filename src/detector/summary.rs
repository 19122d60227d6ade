//! Periodic market summaries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use tracing::info;

use crate::domain::{OpportunityEvent, TradingPair};

/// Best prices of one pair among fresh quotes.
#[derive(Debug, Clone, PartialEq)]
pub enum PairMarket {
    /// Fewer than two venues have fresh quotes.
    Insufficient { venues: usize },
    Market {
        /// Venue with the lowest ask.
        best_buy_venue: String,
        best_ask: Decimal,
        /// Venue with the highest bid.
        best_sell_venue: String,
        best_bid: Decimal,
        /// (best_bid - best_ask) / best_ask * 100, before fees.
        spread_percent: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairSummary {
    pub pair: TradingPair,
    pub market: PairMarket,
}

impl fmt::Display for PairSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.market {
            PairMarket::Insufficient { .. } => write!(f, "{}: Insufficient venues", self.pair),
            PairMarket::Market {
                best_buy_venue,
                best_ask,
                best_sell_venue,
                best_bid,
                spread_percent,
            } => write!(
                f,
                "{}: buy {} @ {} / sell {} @ {} (spread {:.4}%)",
                self.pair,
                best_buy_venue,
                best_ask,
                best_sell_venue,
                best_bid,
                spread_percent.round_dp(4)
            ),
        }
    }
}

/// Rolling figures over the retained events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySummary {
    pub count: usize,
    pub total_net_profit: Decimal,
    /// None when no event is retained.
    pub average_profit_percent: Option<Decimal>,
    pub latest: Option<OpportunityEvent>,
}

impl HistorySummary {
    pub fn from_events<'a>(events: impl Iterator<Item = &'a OpportunityEvent>) -> Self {
        let mut summary = Self::default();
        let mut percent_sum = Decimal::ZERO;

        for event in events {
            summary.count += 1;
            summary.total_net_profit = summary.total_net_profit.saturating_add(event.net_profit);
            percent_sum = percent_sum.saturating_add(event.profit_percent);
            summary.latest = Some(event.clone());
        }

        if summary.count > 0 {
            summary.average_profit_percent = Some(percent_sum / Decimal::from(summary.count));
        }
        summary
    }
}

/// Snapshot of the market and the opportunity history.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSummary {
    pub generated_at: DateTime<Utc>,
    pub pairs: Vec<PairSummary>,
    pub history: HistorySummary,
}

impl MarketSummary {
    /// Writes the summary to the log, one line per pair.
    pub fn log(&self) {
        for pair in &self.pairs {
            info!(pair = %pair.pair, "{}", pair);
        }

        match &self.history.latest {
            Some(latest) => info!(
                count = self.history.count,
                total_net_profit = %self.history.total_net_profit.round_dp(4),
                average_profit_percent = %self
                    .history
                    .average_profit_percent
                    .unwrap_or_default()
                    .round_dp(4),
                latest = %latest,
                "Opportunity history"
            ),
            None => info!("No opportunities detected yet"),
        }
    }
}
