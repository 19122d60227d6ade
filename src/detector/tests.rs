//! Tests for the arbitrage engine and summaries.

use super::*;
use crate::config::Config;
use crate::domain::{FeeTable, OpportunityEvent, Quote, QuoteSource, TradingPair};
use crate::market::QuoteStore;
use crate::notification::{OpportunitySink, SinkError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn btc() -> TradingPair {
    TradingPair::new("BTC", "USDT")
}

fn quote(venue: &str, bid: Decimal, ask: Decimal, at: DateTime<Utc>) -> Quote {
    Quote {
        venue: venue.to_string(),
        symbol: "BTCUSDT".to_string(),
        pair: btc(),
        bid,
        ask,
        observed_at: at,
        source: QuoteSource::Live,
    }
}

fn fees() -> FeeTable {
    FeeTable::new()
        .with_taker("binance", dec!(0.001))
        .with_taker("kraken", dec!(0.0026))
}

fn engine(store: &Arc<QuoteStore>, fees: FeeTable, threshold: Decimal) -> ArbitrageEngine {
    let config = EngineConfig {
        min_profit_threshold: threshold,
        pairs: vec![btc()],
        ..EngineConfig::default()
    };
    ArbitrageEngine::new(Arc::clone(store), fees, config)
}

/// Collects every event it receives.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<OpportunityEvent>>,
}

impl OpportunitySink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn handle(&self, event: &OpportunityEvent) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Binance asks 69000, Kraken bids 70000. Only buying on Binance pays.
async fn scenario(store: &QuoteStore, now: DateTime<Utc>) {
    store.put(quote("binance", dec!(68990), dec!(69000), now)).await;
    store.put(quote("kraken", dec!(70000), dec!(70010), now)).await;
}

// ==================== Detection tests ====================

#[tokio::test]
async fn test_detects_fee_adjusted_opportunity() {
    let store = Arc::new(QuoteStore::new());
    let now = Utc::now();
    scenario(&store, now).await;

    let engine = engine(&store, fees(), dec!(0.001));
    let sink = Arc::new(RecordingSink::default());
    engine.sinks().register(sink.clone());

    let events = engine.detect_once(now).await;

    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.buy_venue, "binance");
    assert_eq!(event.sell_venue, "kraken");
    assert_eq!(event.buy_price, dec!(69000));
    assert_eq!(event.sell_price, dec!(70000));
    // 70000 * 0.9974 - 69000 * 1.001
    assert_eq!(event.net_profit, dec!(749));
    assert_eq!(event.profit_percent.round_dp(4), dec!(1.0844));
    assert_eq!(event.detected_at, now);

    assert_eq!(*sink.events.lock().unwrap(), events);
    assert_eq!(engine.history(), events);
}

#[tokio::test]
async fn test_high_threshold_raises_nothing() {
    let store = Arc::new(QuoteStore::new());
    let now = Utc::now();
    scenario(&store, now).await;

    let engine = engine(&store, fees(), dec!(0.02));

    assert!(engine.detect_once(now).await.is_empty());
    assert_eq!(engine.stats().opportunities_detected, 0);
    assert_eq!(engine.stats().comparisons, 1);
}

#[tokio::test]
async fn test_profit_equal_to_threshold_raises_nothing() {
    let store = Arc::new(QuoteStore::new());
    let now = Utc::now();
    store.put(quote("binance", dec!(99), dec!(100), now)).await;
    store.put(quote("kraken", dec!(101), dec!(102), now)).await;

    // No fees: profit is exactly 101 / 100 - 1.
    let engine = engine(&store, FeeTable::new(), dec!(0.01));
    assert!(engine.detect_once(now).await.is_empty());

    let engine = self::engine(&store, FeeTable::new(), dec!(0.0099));
    assert_eq!(engine.detect_once(now).await.len(), 1);
}

#[tokio::test]
async fn test_stale_side_is_skipped() {
    let store = Arc::new(QuoteStore::new());
    let now = Utc::now();
    // A perfect arbitrage, but Kraken's quote is 11s old.
    store.put(quote("binance", dec!(100), dec!(101), now)).await;
    store
        .put(quote("kraken", dec!(200), dec!(201), now - chrono::Duration::seconds(11)))
        .await;

    let engine = engine(&store, FeeTable::new(), dec!(0.001));

    assert!(engine.detect_once(now).await.is_empty());
    let stats = engine.stats();
    assert_eq!(stats.comparisons, 1);
    assert_eq!(stats.stale_skips, 1);
}

#[tokio::test]
async fn test_fallback_quotes_are_not_compared() {
    let store = Arc::new(QuoteStore::new());
    let now = Utc::now();
    store.put(quote("binance", dec!(100), dec!(101), now)).await;
    let mut fallback = quote("kraken", dec!(200), dec!(201), now);
    fallback.source = QuoteSource::Fallback;
    store.put(fallback).await;

    let engine = engine(&store, FeeTable::new(), dec!(0.001));

    assert!(engine.detect_once(now).await.is_empty());
}

#[tokio::test]
async fn test_both_directions_are_evaluated() {
    let store = Arc::new(QuoteStore::new());
    let now = Utc::now();
    // Crossed books on both venues.
    store.put(quote("binance", dec!(102), dec!(100), now)).await;
    store.put(quote("kraken", dec!(102), dec!(100), now)).await;

    let engine = engine(&store, FeeTable::new(), dec!(0.001));
    let events = engine.detect_once(now).await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].buy_venue, "binance");
    assert_eq!(events[1].buy_venue, "kraken");
}

#[tokio::test]
async fn test_single_venue_has_no_comparison() {
    let store = Arc::new(QuoteStore::new());
    let now = Utc::now();
    store.put(quote("binance", dec!(100), dec!(101), now)).await;

    let engine = engine(&store, FeeTable::new(), dec!(0.001));

    assert!(engine.detect_once(now).await.is_empty());
    let stats = engine.stats();
    assert_eq!(stats.detection_cycles, 1);
    assert_eq!(stats.comparisons, 0);
}

#[tokio::test]
async fn test_pairs_are_compared_separately() {
    let store = Arc::new(QuoteStore::new());
    let now = Utc::now();
    store.put(quote("binance", dec!(100), dec!(101), now)).await;
    let mut eth = quote("kraken", dec!(200), dec!(201), now);
    eth.pair = TradingPair::new("ETH", "USDT");
    store.put(eth).await;

    let engine = engine(&store, FeeTable::new(), dec!(0.001));

    assert!(engine.detect_once(now).await.is_empty());
    assert_eq!(engine.stats().comparisons, 0);
}

#[tokio::test]
async fn test_history_is_bounded() {
    let store = Arc::new(QuoteStore::new());
    let now = Utc::now();
    scenario(&store, now).await;

    let config = EngineConfig {
        min_profit_threshold: dec!(0.001),
        history_size: 2,
        ..EngineConfig::default()
    };
    let engine = ArbitrageEngine::new(Arc::clone(&store), fees(), config);

    for _ in 0..3 {
        engine.detect_once(now).await;
    }

    assert_eq!(engine.history().len(), 2);
    assert_eq!(engine.stats().opportunities_detected, 3);
    assert_eq!(engine.stats().detection_cycles, 3);
}

#[test]
fn test_evaluate_unknown_venue_has_zero_fee() {
    let now = Utc::now();
    let buy = quote("somewhere", dec!(99), dec!(100), now);
    let sell = quote("elsewhere", dec!(110), dec!(111), now);

    let event = evaluate(&buy, &sell, &FeeTable::new(), dec!(0.001), now).unwrap();
    assert_eq!(event.net_profit, dec!(10));
    assert_eq!(event.profit_percent, dec!(10));
}

// ==================== Summary tests ====================

#[tokio::test]
async fn test_summary_single_venue_is_insufficient() {
    let store = Arc::new(QuoteStore::new());
    let now = Utc::now();
    store.put(quote("binance", dec!(100), dec!(101), now)).await;

    let engine = engine(&store, FeeTable::new(), dec!(0.001));
    let summary = engine.summarize(now).await;

    assert_eq!(summary.pairs.len(), 1);
    assert_eq!(summary.pairs[0].market, PairMarket::Insufficient { venues: 1 });
    assert_eq!(summary.pairs[0].to_string(), "BTC/USDT: Insufficient venues");
    assert_eq!(summary.history.count, 0);
    assert!(summary.history.average_profit_percent.is_none());
}

#[tokio::test]
async fn test_summary_lists_unquoted_configured_pairs() {
    let store = Arc::new(QuoteStore::new());
    let config = EngineConfig {
        pairs: vec![btc(), TradingPair::new("ETH", "USDT")],
        ..EngineConfig::default()
    };
    let engine = ArbitrageEngine::new(Arc::clone(&store), FeeTable::new(), config);

    let summary = engine.summarize(Utc::now()).await;

    assert_eq!(summary.pairs.len(), 2);
    for pair in &summary.pairs {
        assert_eq!(pair.market, PairMarket::Insufficient { venues: 0 });
    }
}

#[tokio::test]
async fn test_summary_best_prices_and_history() {
    let store = Arc::new(QuoteStore::new());
    let now = Utc::now();
    scenario(&store, now).await;
    // Stale quotes do not count towards the best prices.
    store
        .put(quote("poloniex", dec!(90000), dec!(1), now - chrono::Duration::seconds(30)))
        .await;

    let engine = engine(&store, fees(), dec!(0.001));
    engine.detect_once(now).await;
    let summary = engine.summarize(now).await;

    assert_eq!(
        summary.pairs[0].market,
        PairMarket::Market {
            best_buy_venue: "binance".to_string(),
            best_ask: dec!(69000),
            best_sell_venue: "kraken".to_string(),
            best_bid: dec!(70000),
            spread_percent: dec!(1000) / dec!(69000) * dec!(100),
        }
    );
    assert_eq!(summary.history.count, 1);
    assert_eq!(summary.history.total_net_profit, dec!(749));
    assert_eq!(summary.history.latest.as_ref().unwrap().sell_venue, "kraken");
}

#[test]
fn test_history_summary_average() {
    let now = Utc::now();
    let buy = quote("a", dec!(99), dec!(100), now);
    let first = evaluate(&buy, &quote("b", dec!(102), dec!(103), now), &FeeTable::new(), Decimal::ZERO, now).unwrap();
    let second = evaluate(&buy, &quote("b", dec!(104), dec!(105), now), &FeeTable::new(), Decimal::ZERO, now).unwrap();

    let summary = HistorySummary::from_events([first, second].iter());

    assert_eq!(summary.count, 2);
    assert_eq!(summary.total_net_profit, dec!(6));
    assert_eq!(summary.average_profit_percent, Some(dec!(3)));
    assert_eq!(summary.latest.unwrap().sell_price, dec!(104));
}

// ==================== Loop and config tests ====================

#[tokio::test]
async fn test_detection_loop_stops_on_shutdown() {
    let store = Arc::new(QuoteStore::new());
    let config = EngineConfig {
        detection_interval: Duration::from_millis(10),
        ..EngineConfig::default()
    };
    let engine = Arc::new(ArbitrageEngine::new(store, FeeTable::new(), config));
    let (tx, mut rx) = tokio::sync::broadcast::channel(1);

    let task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run_detection(&mut rx).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();

    assert!(engine.stats().detection_cycles >= 1);
}

#[test]
fn test_engine_config_from_config() {
    let yaml = r#"
app:
  name: arbwatch
  env: test
exchanges:
  binance:
    enabled: true
    fee_taker: "0.001"
arbitrage:
  min_profit_threshold: "0.002"
  detection_interval: 250ms
  history_size: 10
pairs:
  - BTC/USDT
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    let engine_config = EngineConfig::from_config(&config).unwrap();

    assert_eq!(engine_config.min_profit_threshold, dec!(0.002));
    assert_eq!(engine_config.detection_interval, Duration::from_millis(250));
    assert_eq!(engine_config.summary_interval, Duration::from_secs(5));
    assert_eq!(engine_config.stale_after, Duration::from_secs(10));
    assert_eq!(engine_config.history_size, 10);
    assert_eq!(engine_config.pairs, vec![btc()]);
}

#[test]
fn test_engine_config_defaults_without_section() {
    let yaml = r#"
app:
  name: arbwatch
  env: test
exchanges: {}
pairs:
  - BTC/USDT
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    let engine_config = EngineConfig::from_config(&config).unwrap();

    assert_eq!(engine_config.min_profit_threshold, dec!(0.001));
    assert_eq!(engine_config.history_size, 100);
}

// ==================== Edge input tests ====================

#[test]
fn test_evaluate_out_of_range_price_raises_nothing() {
    let now = Utc::now();
    let buy = quote("binance", Decimal::MAX, Decimal::MAX, now);
    let sell = quote("kraken", Decimal::MAX, Decimal::MAX, now);

    assert!(evaluate(&buy, &sell, &fees(), dec!(0.001), now).is_none());
    assert!(evaluate(&sell, &buy, &fees(), dec!(0.001), now).is_none());
}

#[tokio::test]
async fn test_detection_survives_extreme_quotes() {
    let store = Arc::new(QuoteStore::new());
    let now = Utc::now();
    store.put(quote("binance", dec!(1), Decimal::MAX, now)).await;
    store.put(quote("kraken", Decimal::MAX, Decimal::MAX, now)).await;

    let engine = engine(&store, fees(), dec!(0.001));

    assert!(engine.detect_once(now).await.is_empty());
    let summary = engine.summarize(now).await;
    assert_eq!(summary.pairs.len(), 1);
    assert_eq!(engine.stats().detection_cycles, 1);
}

#[tokio::test]
async fn test_capitalised_exchange_keys_keep_their_fees() {
    let yaml = r#"
app:
  name: arbwatch
  env: test
exchanges:
  Binance:
    enabled: true
    fee_taker: "0.001"
  Kraken:
    enabled: true
    fee_taker: "0.0026"
pairs:
  - BTC/USDT
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    let store = Arc::new(QuoteStore::new());
    let now = Utc::now();
    // Feeds publish under lowercase venue names.
    store.put(quote("binance", dec!(68990), dec!(69000), now)).await;
    store.put(quote("kraken", dec!(69100), dec!(69110), now)).await;

    let engine = ArbitrageEngine::new(
        Arc::clone(&store),
        config.fee_table().unwrap(),
        EngineConfig::from_config(&config).unwrap(),
    );

    // 69100 * 0.9974 < 69000 * 1.001: fees eat the gap.
    assert!(engine.detect_once(now).await.is_empty());
}
