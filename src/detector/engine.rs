//! Cross-venue arbitrage detection.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::summary::{HistorySummary, MarketSummary, PairMarket, PairSummary};
use crate::config::{Config, ConfigError};
use crate::domain::{FeeTable, OpportunityEvent, Quote, TradingPair};
use crate::market::QuoteStore;
use crate::notification::SinkRegistry;

pub const DEFAULT_DETECTION_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_SUMMARY_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(10);
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// Detection cycles between two progress log lines.
const PROGRESS_LOG_EVERY: u64 = 20;

/// Detection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Minimum fee-adjusted profit, as a fraction, that raises an event.
    pub min_profit_threshold: Decimal,
    pub detection_interval: Duration,
    pub summary_interval: Duration,
    /// Quotes older than this are not compared.
    pub stale_after: Duration,
    /// Number of recent events retained for summaries.
    pub history_size: usize,
    /// Pairs always listed in summaries, quoted or not.
    pub pairs: Vec<TradingPair>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // 0.1%
            min_profit_threshold: Decimal::new(1, 3),
            detection_interval: DEFAULT_DETECTION_INTERVAL,
            summary_interval: DEFAULT_SUMMARY_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
            history_size: DEFAULT_HISTORY_SIZE,
            pairs: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Builds the engine settings, filling unset values with defaults.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let arbitrage = config.arbitrage.clone().unwrap_or_default();

        let or_default = |value: Duration, default: Duration| {
            if value.is_zero() { default } else { value }
        };

        let history_size = match arbitrage.history_size {
            Some(0) => {
                return Err(ConfigError::Validation(
                    "arbitrage.history_size must be positive".into(),
                ));
            }
            Some(size) => size,
            None => defaults.history_size,
        };

        Ok(Self {
            min_profit_threshold: config.min_profit_threshold()?,
            detection_interval: or_default(arbitrage.detection_interval, defaults.detection_interval),
            summary_interval: or_default(arbitrage.summary_interval, defaults.summary_interval),
            stale_after: or_default(arbitrage.stale_after, defaults.stale_after),
            history_size,
            pairs: config.trading_pairs()?,
        })
    }
}

/// Runtime statistics of the engine. All counters only grow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub detection_cycles: u64,
    /// Venue pairs considered, one per unordered pair per cycle.
    pub comparisons: u64,
    /// Comparisons skipped because one side was stale.
    pub stale_skips: u64,
    pub opportunities_detected: u64,
}

/// ArbitrageEngine compares the latest quotes of every venue pair and raises
/// an `OpportunityEvent` for each profitable direction.
pub struct ArbitrageEngine {
    store: Arc<QuoteStore>,
    fees: FeeTable,
    config: EngineConfig,
    sinks: SinkRegistry,
    history: Mutex<VecDeque<OpportunityEvent>>,
    stats: Mutex<Stats>,
}

impl ArbitrageEngine {
    pub fn new(store: Arc<QuoteStore>, fees: FeeTable, config: EngineConfig) -> Self {
        let history = VecDeque::with_capacity(config.history_size);
        Self {
            store,
            fees,
            config,
            sinks: SinkRegistry::new(),
            history: Mutex::new(history),
            stats: Mutex::new(Stats::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the registry events are dispatched to.
    pub fn sinks(&self) -> &SinkRegistry {
        &self.sinks
    }

    /// Returns a copy of the current statistics.
    pub fn stats(&self) -> Stats {
        lock(&self.stats).clone()
    }

    /// Returns the retained events, oldest first.
    pub fn history(&self) -> Vec<OpportunityEvent> {
        lock(&self.history).iter().cloned().collect()
    }

    /// Runs one detection cycle against the current snapshot.
    ///
    /// Every event is recorded and dispatched to the sinks before the next
    /// direction is evaluated. Returns the events raised in this cycle.
    pub async fn detect_once(&self, now: DateTime<Utc>) -> Vec<OpportunityEvent> {
        let snapshot = self.store.snapshot().await;
        let mut events = Vec::new();
        let mut comparisons = 0;
        let mut stale_skips = 0;

        for (pair, quotes) in group_by_pair(&snapshot) {
            for (i, a) in quotes.iter().enumerate() {
                for b in &quotes[i + 1..] {
                    comparisons += 1;

                    if a.is_stale(now, self.config.stale_after)
                        || b.is_stale(now, self.config.stale_after)
                    {
                        stale_skips += 1;
                        debug!(pair = %pair, venue_a = %a.venue, venue_b = %b.venue, "Skipping stale comparison");
                        continue;
                    }
                    if !a.is_comparable() || !b.is_comparable() {
                        continue;
                    }

                    for (buy, sell) in [(*a, *b), (*b, *a)] {
                        if let Some(event) =
                            evaluate(buy, sell, &self.fees, self.config.min_profit_threshold, now)
                        {
                            self.record(&event);
                            events.push(event);
                        }
                    }
                }
            }
        }

        let mut stats = lock(&self.stats);
        stats.detection_cycles += 1;
        stats.comparisons += comparisons;
        stats.stale_skips += stale_skips;

        events
    }

    fn record(&self, event: &OpportunityEvent) {
        {
            let mut history = lock(&self.history);
            history.push_back(event.clone());
            while history.len() > self.config.history_size {
                history.pop_front();
            }
        }
        lock(&self.stats).opportunities_detected += 1;

        self.sinks.notify(event);
    }

    /// Summarizes the market per pair and the retained history.
    pub async fn summarize(&self, now: DateTime<Utc>) -> MarketSummary {
        let snapshot = self.store.snapshot().await;
        let groups = group_by_pair(&snapshot);

        let mut pairs: Vec<TradingPair> = self.config.pairs.clone();
        for pair in groups.keys() {
            if !pairs.contains(*pair) {
                pairs.push((*pair).clone());
            }
        }
        pairs.sort();

        let pairs = pairs
            .into_iter()
            .map(|pair| {
                let fresh: Vec<&Quote> = groups
                    .get(&pair)
                    .map(|quotes| {
                        quotes
                            .iter()
                            .copied()
                            .filter(|q| q.is_comparable() && !q.is_stale(now, self.config.stale_after))
                            .collect()
                    })
                    .unwrap_or_default();

                let market = summarize_market(&fresh);
                PairSummary { pair, market }
            })
            .collect();

        MarketSummary {
            generated_at: now,
            pairs,
            history: HistorySummary::from_events(lock(&self.history).iter()),
        }
    }

    /// Runs detection every `detection_interval` until shutdown.
    pub async fn run_detection(&self, shutdown: &mut broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.detection_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval = ?self.config.detection_interval,
            threshold = %self.config.min_profit_threshold,
            stale_after = ?self.config.stale_after,
            "Starting detection loop"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Detection loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let events = self.detect_once(Utc::now()).await;
                    let stats = self.stats();

                    if stats.detection_cycles % PROGRESS_LOG_EVERY == 1 {
                        info!(
                            cycle = stats.detection_cycles,
                            comparisons = stats.comparisons,
                            stale_skips = stats.stale_skips,
                            opportunities = stats.opportunities_detected,
                            "Detection cycle running"
                        );
                    }
                    if !events.is_empty() {
                        debug!(count = events.len(), "Opportunities raised this cycle");
                    }
                }
            }
        }
    }

    /// Logs a market summary every `summary_interval` until shutdown.
    pub async fn run_summary(&self, shutdown: &mut broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.summary_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; skip it so the first summary
        // sees some quotes.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Summary loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.summarize(Utc::now()).await.log();
                }
            }
        }
    }
}

/// Evaluates buying on `buy` and selling on `sell`.
///
/// Returns an event when the fee-adjusted profit is strictly above `threshold`.
pub fn evaluate(
    buy: &Quote,
    sell: &Quote,
    fees: &FeeTable,
    threshold: Decimal,
    now: DateTime<Utc>,
) -> Option<OpportunityEvent> {
    let (Some(effective_buy), Some(effective_sell)) = (
        fee_adjusted(buy.ask, Decimal::ONE.checked_add(fees.taker(&buy.venue))),
        fee_adjusted(sell.bid, Decimal::ONE.checked_sub(fees.taker(&sell.venue))),
    ) else {
        debug!(buy_venue = %buy.venue, sell_venue = %sell.venue, "Fee-adjusted price out of range");
        return None;
    };
    if effective_buy <= Decimal::ZERO {
        return None;
    }

    let profit = effective_sell
        .checked_div(effective_buy)?
        .checked_sub(Decimal::ONE)?;
    if profit <= threshold {
        return None;
    }
    let (Some(profit_percent), Some(net_profit)) = (
        profit.checked_mul(Decimal::ONE_HUNDRED),
        effective_sell.checked_sub(effective_buy),
    ) else {
        debug!(buy_venue = %buy.venue, sell_venue = %sell.venue, "Profit out of range");
        return None;
    };

    Some(OpportunityEvent {
        detected_at: now,
        base: buy.pair.base.clone(),
        quote: buy.pair.quote.clone(),
        buy_venue: buy.venue.clone(),
        sell_venue: sell.venue.clone(),
        buy_price: buy.ask,
        sell_price: sell.bid,
        profit_percent,
        net_profit,
    })
}

fn fee_adjusted(price: Decimal, factor: Option<Decimal>) -> Option<Decimal> {
    price.checked_mul(factor?)
}

/// Groups a snapshot by pair. Within a group, quotes keep snapshot order.
fn group_by_pair(snapshot: &[Quote]) -> BTreeMap<&TradingPair, Vec<&Quote>> {
    let mut groups: BTreeMap<&TradingPair, Vec<&Quote>> = BTreeMap::new();
    for quote in snapshot {
        groups.entry(&quote.pair).or_default().push(quote);
    }
    groups
}

fn summarize_market(fresh: &[&Quote]) -> PairMarket {
    if fresh.len() < 2 {
        return PairMarket::Insufficient { venues: fresh.len() };
    }

    let mut best_buy = fresh[0];
    let mut best_sell = fresh[0];
    for quote in &fresh[1..] {
        if quote.ask < best_buy.ask {
            best_buy = quote;
        }
        if quote.bid > best_sell.bid {
            best_sell = quote;
        }
    }

    let spread_percent = best_sell
        .bid
        .checked_sub(best_buy.ask)
        .and_then(|spread| spread.checked_div(best_buy.ask))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or_default();

    PairMarket::Market {
        best_buy_venue: best_buy.venue.clone(),
        best_ask: best_buy.ask,
        best_sell_venue: best_sell.venue.clone(),
        best_bid: best_sell.bid,
        spread_percent,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
