//! Synthetic quote feed for demos and offline runs.
//!
//! Every simulated venue tracks the same slowly oscillating market mid, so
//! ordinary ticks never cross between venues. With a configurable
//! probability a tick shifts one venue's book by [`DISLOCATION`] of the mid,
//! which is large enough to beat typical taker fees.

use std::f64::consts::TAU;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::{create_venue, ConnectorState, FeedError, FeedExit, FeedSource, Result};
use crate::config::SimulationConfig;
use crate::domain::{Quote, QuoteSource, TradingPair};
use crate::market::QuoteStore;

const DEFAULT_BASE_PRICE: i64 = 70_000;
const DEFAULT_MAX_DRIFT: i64 = 1_000;
const DEFAULT_SPREAD: i64 = 50;
const DEFAULT_DISLOCATION_PROBABILITY: f64 = 0.05;
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Period of the shared mid-price oscillation, in seconds.
const DRIFT_PERIOD_SECS: f64 = 300.0;

/// Relative shift of a dislocated tick (2%).
const DISLOCATION: Decimal = Decimal::from_parts(2, 0, 0, false, 2);

/// Parameters of the synthetic market.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParams {
    pub base_price: Decimal,
    pub max_drift: Decimal,
    pub spread: Decimal,
    pub dislocation_probability: f64,
    pub tick_interval: Duration,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            base_price: Decimal::from(DEFAULT_BASE_PRICE),
            max_drift: Decimal::from(DEFAULT_MAX_DRIFT),
            spread: Decimal::from(DEFAULT_SPREAD),
            dislocation_probability: DEFAULT_DISLOCATION_PROBABILITY,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

impl SimulationParams {
    /// Builds parameters from the `simulation` section, defaulting missing values.
    pub fn from_config(config: Option<&SimulationConfig>) -> Result<Self> {
        let mut params = Self::default();
        let Some(config) = config else {
            return Ok(params);
        };

        if let Some(raw) = config.base_price.as_deref() {
            params.base_price = parse_setting("base_price", raw)?;
        }
        if let Some(raw) = config.max_drift.as_deref() {
            params.max_drift = parse_setting("max_drift", raw)?;
        }
        if let Some(raw) = config.spread.as_deref() {
            params.spread = parse_setting("spread", raw)?;
        }
        if let Some(p) = config.dislocation_probability {
            params.dislocation_probability = p;
        }
        if !config.tick_interval.is_zero() {
            params.tick_interval = config.tick_interval;
        }

        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<()> {
        if self.base_price <= Decimal::ZERO {
            return Err(FeedError::InvalidSettings(
                "simulation.base_price must be positive".into(),
            ));
        }
        if self.max_drift.is_sign_negative() || self.spread.is_sign_negative() {
            return Err(FeedError::InvalidSettings(
                "simulation.max_drift and simulation.spread must not be negative".into(),
            ));
        }
        if self.max_drift + self.spread >= self.base_price {
            return Err(FeedError::InvalidSettings(
                "simulation.max_drift plus spread must stay below base_price".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.dislocation_probability) {
            return Err(FeedError::InvalidSettings(format!(
                "simulation.dislocation_probability must be within [0, 1], got {}",
                self.dislocation_probability
            )));
        }
        Ok(())
    }

    /// Shared mid price at `now`.
    fn mid_at(&self, now: DateTime<Utc>) -> Decimal {
        let seconds = now.timestamp_millis() as f64 / 1_000.0;
        let phase = (seconds / DRIFT_PERIOD_SECS * TAU).sin();
        self.base_price + to_decimal(phase) * self.max_drift
    }
}

fn parse_setting(field: &str, raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim()).map_err(|e| {
        FeedError::InvalidSettings(format!("simulation.{}: invalid decimal {:?}: {}", field, raw, e))
    })
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64_retain(value).unwrap_or_default()
}

/// SimulatedFeed publishes synthetic quotes for one venue and pair.
pub struct SimulatedFeed {
    venue: String,
    pair: TradingPair,
    symbol: String,
    params: SimulationParams,
    rng: Mutex<StdRng>,
    state: watch::Sender<ConnectorState>,
}

impl SimulatedFeed {
    pub fn new(venue: &str, pair: TradingPair, params: SimulationParams) -> Self {
        Self::with_rng(venue, pair, params, StdRng::from_entropy())
    }

    /// Creates a feed with a reproducible random sequence.
    pub fn with_seed(venue: &str, pair: TradingPair, params: SimulationParams, seed: u64) -> Self {
        Self::with_rng(venue, pair, params, StdRng::seed_from_u64(seed))
    }

    fn with_rng(venue: &str, pair: TradingPair, params: SimulationParams, rng: StdRng) -> Self {
        let symbol = create_venue(venue, None)
            .map(|v| v.format_symbol(&pair))
            .unwrap_or_else(|_| pair.to_string());
        let (state, _) = watch::channel(ConnectorState::Disconnected);
        Self {
            venue: venue.to_lowercase(),
            pair,
            symbol,
            params,
            rng: Mutex::new(rng),
            state,
        }
    }

    /// Generates the quote for `now`.
    pub fn next_quote(&self, now: DateTime<Utc>) -> Quote {
        let mid = self.params.mid_at(now);
        let spread = self.params.spread;

        let (mut bid, mut ask, dislocated) = {
            let mut rng = match self.rng.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let bid = mid - to_decimal(rng.gen_range(0.0..=1.0)) * spread;
            let ask = mid + to_decimal(rng.gen_range(0.0..=1.0)) * spread;
            let dislocated = rng.gen_bool(self.params.dislocation_probability);
            let upward = rng.gen_bool(0.5);
            (bid, ask, dislocated.then_some(upward))
        };

        if let Some(upward) = dislocated {
            let shift = mid * DISLOCATION;
            if upward {
                bid += shift;
                ask += shift;
            } else {
                bid -= shift;
                ask -= shift;
            }
            debug!(venue = %self.venue, pair = %self.pair, upward, "dislocated tick");
        }

        Quote {
            venue: self.venue.clone(),
            symbol: self.symbol.clone(),
            pair: self.pair.clone(),
            bid: bid.round_dp(2),
            ask: ask.round_dp(2),
            observed_at: now,
            source: QuoteSource::Simulated,
        }
    }
}

#[async_trait]
impl FeedSource for SimulatedFeed {
    fn venue(&self) -> &str {
        &self.venue
    }

    fn pair(&self) -> &TradingPair {
        &self.pair
    }

    fn state(&self) -> ConnectorState {
        *self.state.borrow()
    }

    fn retry_delay(&self) -> Duration {
        self.params.tick_interval
    }

    async fn run(&self, store: Arc<QuoteStore>, shutdown: &mut broadcast::Receiver<()>) -> FeedExit {
        info!(venue = %self.venue, pair = %self.pair, interval = ?self.params.tick_interval, "simulated feed started");
        self.state.send_replace(ConnectorState::Streaming);

        let mut ticker = tokio::time::interval(self.params.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    let quote = self.next_quote(Utc::now());
                    store.put(quote).await;
                }
            }
        }

        self.state.send_replace(ConnectorState::Closed);
        info!(venue = %self.venue, pair = %self.pair, "simulated feed stopped");
        FeedExit::Shutdown
    }
}
