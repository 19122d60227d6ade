//! Main arbitrage monitor.
//!
//! Wires the components together: feeds write into the shared quote store,
//! the engine reads it and hands opportunities to the sinks.

mod config;
mod error;

pub use config::BotConfig;
pub use error::BotError;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{Config, FeedKind};
use crate::detector::{ArbitrageEngine, EngineConfig, Stats};
use crate::exchanges::{ConnectorState, Manager};
use crate::market::QuoteStore;
use crate::notification::{
    BroadcastSink, LogSink, ShutdownData, StartupData, TelegramSettings, TelegramSink,
};
use crate::storage::CsvSink;

/// Bot owns the quote store, the feeds, the engine and the sinks.
pub struct Bot {
    cfg: Config,
    version: String,
    store: Arc<QuoteStore>,
    manager: Manager,
    engine: Arc<ArbitrageEngine>,
    telegram: Option<Arc<TelegramSink>>,

    // Runtime state
    shutdown: broadcast::Sender<()>,
    tasks: Mutex<JoinSet<()>>,
    started_at: Mutex<Option<Instant>>,
    running: Mutex<bool>,
}

impl Bot {
    /// Creates a new Bot instance. Must be called inside a tokio runtime.
    pub async fn new(cfg: BotConfig) -> Result<Self, BotError> {
        let app_config = cfg.app_config;

        let store = Arc::new(QuoteStore::new());
        let manager = Manager::from_config(&app_config).await?;
        let engine = Arc::new(ArbitrageEngine::new(
            Arc::clone(&store),
            app_config.fee_table()?,
            EngineConfig::from_config(&app_config)?,
        ));

        // Registration order is dispatch order.
        let sinks = engine.sinks();
        sinks.register(Arc::new(LogSink));

        sinks.register(Arc::new(BroadcastSink::new()));

        if let Some(storage) = app_config.storage.as_ref().filter(|s| s.enabled) {
            sinks.register(Arc::new(CsvSink::open(storage.path())?));
        }

        let telegram = Self::create_telegram(&app_config);
        if let Some(telegram) = &telegram {
            sinks.register(telegram.clone());
        }

        let (shutdown, _) = broadcast::channel(1);

        Ok(Bot {
            cfg: app_config,
            version: cfg.version,
            store,
            manager,
            engine,
            telegram,
            shutdown,
            tasks: Mutex::new(JoinSet::new()),
            started_at: Mutex::new(None),
            running: Mutex::new(false),
        })
    }

    fn create_telegram(cfg: &Config) -> Option<Arc<TelegramSink>> {
        let telegram = cfg.notification.as_ref()?.telegram.as_ref()?;
        if !telegram.enabled {
            return None;
        }
        if telegram.bot_token.is_empty() || telegram.chat_id.is_empty() {
            warn!("Telegram enabled but TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID is missing");
            return None;
        }

        let settings = TelegramSettings {
            bot_token: telegram.bot_token.clone(),
            chat_id: telegram.chat_id.clone(),
            notify_opportunities: telegram.notify_opportunities,
            notify_lifecycle: telegram.notify_lifecycle,
        };

        match TelegramSink::new(settings) {
            Ok(sink) => {
                info!("Telegram notifier created");
                Some(Arc::new(sink))
            }
            Err(e) => {
                warn!(error = %e, "Failed to create Telegram notifier");
                None
            }
        }
    }

    /// Starts the feeds, the detection loop and the summary loop.
    ///
    /// Returns once every task is spawned.
    pub async fn start(&self) -> Result<(), BotError> {
        {
            let mut running = self.running.lock().await;
            if *running {
                return Err(BotError::AlreadyRunning);
            }
            *running = true;
        }

        *self.started_at.lock().await = Some(Instant::now());

        let venues = self.cfg.enabled_exchanges();
        let simulated = self.simulated_venues();

        info!(
            name = %self.cfg.app.name,
            env = %self.cfg.app.env,
            version = %self.version,
            exchanges = ?venues,
            simulated = ?simulated,
            pairs = ?self.cfg.pairs,
            "Starting arbitrage monitor"
        );

        let mut tasks = self.tasks.lock().await;
        let feeds = self
            .manager
            .spawn_all(&self.store, &self.shutdown, &mut tasks)
            .await;

        // Receivers are taken before spawning so no signal can be missed.
        let engine = Arc::clone(&self.engine);
        let mut shutdown = self.shutdown.subscribe();
        tasks.spawn(async move { engine.run_detection(&mut shutdown).await });

        let engine = Arc::clone(&self.engine);
        let mut shutdown = self.shutdown.subscribe();
        tasks.spawn(async move { engine.run_summary(&mut shutdown).await });

        info!(feeds, tasks = tasks.len(), "Arbitrage monitor started");

        if let Some(telegram) = &self.telegram {
            telegram.notify_startup(&StartupData {
                version: self.version.clone(),
                venues,
                pairs: self.cfg.pairs.clone(),
                simulated,
                threshold: self.engine.config().min_profit_threshold,
            });
        }

        Ok(())
    }

    /// Signals shutdown and waits up to `app.shutdown_grace` for every task.
    /// Tasks still running after that are aborted.
    pub async fn stop(&self, reason: &str) -> Result<(), BotError> {
        {
            let mut running = self.running.lock().await;
            if !*running {
                return Err(BotError::NotRunning);
            }
            *running = false;
        }

        info!(reason, "Stopping arbitrage monitor...");

        // No receivers means no task is left to stop.
        let _ = self.shutdown.send(());

        let grace = self.cfg.app.shutdown_grace();
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        let graceful = tokio::time::timeout(grace, drain(&mut tasks)).await.is_ok();

        if !graceful {
            warn!(remaining = tasks.len(), grace = ?grace, "Tasks did not stop in time, aborting");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        let uptime = self.uptime().await;
        let stats = self.stats();

        if let Some(telegram) = &self.telegram {
            telegram.notify_shutdown(&ShutdownData {
                reason: reason.to_string(),
                uptime,
                graceful,
                detection_cycles: stats.detection_cycles,
                opportunities_detected: stats.opportunities_detected,
            });
            telegram.close().await;
        }

        info!(
            uptime = ?uptime,
            graceful,
            detection_cycles = stats.detection_cycles,
            opportunities = stats.opportunities_detected,
            "Arbitrage monitor stopped"
        );

        Ok(())
    }

    /// Returns a copy of the current statistics.
    pub fn stats(&self) -> Stats {
        self.engine.stats()
    }

    /// Returns true if the bot is currently running.
    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    /// Returns how long the bot has been running.
    pub async fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .await
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    pub fn store(&self) -> &Arc<QuoteStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<ArbitrageEngine> {
        &self.engine
    }

    /// Returns the lifecycle state of every feed.
    pub async fn feed_status(&self) -> Vec<(String, ConnectorState)> {
        let mut status: Vec<_> = self.manager.status().await.into_iter().collect();
        status.sort_by(|a, b| a.0.cmp(&b.0));
        status
    }

    /// Returns enabled exchanges fed by the synthetic generator, sorted.
    fn simulated_venues(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .cfg
            .exchanges
            .iter()
            .filter(|(_, ex)| ex.enabled && ex.source == FeedKind::Simulated)
            .map(|(name, _)| name.to_lowercase())
            .collect();
        names.sort();
        names
    }
}

/// Waits for every task, logging the ones that panicked.
async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            if e.is_panic() {
                error!(error = %e, "Task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TradingPair;
    use crate::storage::CSV_HEADER;
    use tempfile::TempDir;

    fn config(csv_path: &str) -> Config {
        let yaml = format!(
            r#"
app:
  name: arbwatch-test
  env: test
  shutdown_grace: 2s
exchanges:
  binance:
    enabled: true
    fee_taker: "0.001"
    source: simulated
  kraken:
    enabled: true
    fee_taker: "0.0026"
    source: simulated
  poloniex:
    enabled: false
    fee_taker: "0.002"
arbitrage:
  min_profit_threshold: "0.001"
  detection_interval: 20ms
  summary_interval: 50ms
simulation:
  tick_interval: 10ms
storage:
  enabled: true
  path: "{}"
pairs:
  - BTC/USDT
"#,
            csv_path
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    async fn bot(dir: &TempDir) -> Bot {
        let path = dir.path().join("out/opportunities.csv");
        let cfg = config(path.to_str().unwrap());
        Bot::new(BotConfig::new(cfg)).await.unwrap()
    }

    #[tokio::test]
    async fn test_new_opens_csv_log() {
        let dir = TempDir::new().unwrap();
        let bot = bot(&dir).await;

        let content = std::fs::read_to_string(dir.path().join("out/opportunities.csv")).unwrap();
        assert_eq!(content.trim_end(), CSV_HEADER);
        // log, broadcast, csv
        assert_eq!(bot.engine().sinks().len(), 3);
        assert!(!bot.is_running().await);
    }

    #[tokio::test]
    async fn test_start_streams_quotes_and_stops() {
        let dir = TempDir::new().unwrap();
        let bot = bot(&dir).await;

        bot.start().await.unwrap();
        assert!(bot.is_running().await);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let pair = TradingPair::new("BTC", "USDT");
        assert!(bot.store().get("binance", &pair).await.is_some());
        assert!(bot.store().get("kraken", &pair).await.is_some());
        assert!(bot.store().get("poloniex", &pair).await.is_none());
        assert!(bot.stats().detection_cycles >= 1);

        let status = bot.feed_status().await;
        assert_eq!(status.len(), 2);
        assert!(status.iter().all(|(_, s)| *s == ConnectorState::Streaming));

        tokio::time::timeout(Duration::from_secs(3), bot.stop("test"))
            .await
            .unwrap()
            .unwrap();
        assert!(!bot.is_running().await);
        assert!(bot.feed_status().await.iter().all(|(_, s)| *s == ConnectorState::Closed));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let dir = TempDir::new().unwrap();
        let bot = bot(&dir).await;

        bot.start().await.unwrap();
        assert!(matches!(bot.start().await, Err(BotError::AlreadyRunning)));
        bot.stop("test").await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start_fails() {
        let dir = TempDir::new().unwrap();
        let bot = bot(&dir).await;

        assert!(matches!(bot.stop("test").await, Err(BotError::NotRunning)));
    }

    #[tokio::test]
    async fn test_unsupported_exchange_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(dir.path().join("o.csv").to_str().unwrap());
        let mut bitmex = cfg.exchanges["binance"].clone();
        bitmex.source = FeedKind::Live;
        cfg.exchanges.insert("bitmex".to_string(), bitmex);

        let result = Bot::new(BotConfig::new(cfg)).await;
        assert!(matches!(result, Err(BotError::Feed(_))));
    }
}
