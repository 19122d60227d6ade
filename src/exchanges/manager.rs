//! Manager for the set of running feeds.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::{
    create_venue, Connector, ConnectorConfig, ConnectorState, FeedError, FeedExit, FeedSource,
    Result, SimulatedFeed, SimulationParams,
};
use crate::config::{Config, ExchangeConfig, FeedKind};
use crate::domain::TradingPair;
use crate::market::QuoteStore;

/// Manager owns one feed per (venue, pair) and supervises their tasks.
pub struct Manager {
    /// Map of feed id ("venue:BASE/QUOTE") to feed.
    feeds: Arc<RwLock<HashMap<String, Arc<dyn FeedSource>>>>,
}

impl Manager {
    /// Creates a new Manager instance.
    pub fn new() -> Self {
        Self {
            feeds: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a new Manager from configuration.
    /// One feed is created for every enabled exchange and every pair.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let manager = Self::new();
        let pairs = config
            .trading_pairs()
            .map_err(|e| FeedError::InvalidSettings(e.to_string()))?;
        let simulation = SimulationParams::from_config(config.simulation.as_ref())?;

        let mut names: Vec<&String> = config.exchanges.keys().collect();
        names.sort();

        for name in names {
            let exchange_config = &config.exchanges[name];
            if !exchange_config.enabled {
                info!(exchange = %name, "Skipping disabled exchange");
                continue;
            }

            info!(exchange = %name, source = ?exchange_config.source, "Loading exchange from config");

            for pair in &pairs {
                let feed = Self::create_feed(name, exchange_config, pair.clone(), &simulation)?;
                manager.register(feed).await?;
            }
        }

        Ok(manager)
    }

    /// Factory method to create a feed based on exchange name and config.
    fn create_feed(
        name: &str,
        config: &ExchangeConfig,
        pair: TradingPair,
        simulation: &SimulationParams,
    ) -> Result<Arc<dyn FeedSource>> {
        match config.source {
            FeedKind::Live => {
                let url = config.websocket.as_ref().and_then(|ws| ws.url.as_deref());
                let venue = create_venue(name, url)?;
                let timing = ConnectorConfig::from_config(config.websocket.as_ref());
                Ok(Arc::new(Connector::new(venue, pair, timing)))
            }
            FeedKind::Simulated => Ok(Arc::new(SimulatedFeed::new(
                name,
                pair,
                simulation.clone(),
            ))),
        }
    }

    /// Registers a new feed with the manager.
    pub async fn register(&self, feed: Arc<dyn FeedSource>) -> Result<()> {
        let id = feed.id();
        let mut feeds = self.feeds.write().await;
        if feeds.contains_key(&id) {
            return Err(FeedError::Duplicate(id));
        }
        info!(feed = %id, "Registering feed");
        feeds.insert(id, feed);
        Ok(())
    }

    /// Returns all registered feed ids, sorted.
    pub async fn list(&self) -> Vec<String> {
        let feeds = self.feeds.read().await;
        let mut ids: Vec<String> = feeds.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the lifecycle state of every feed.
    pub async fn status(&self) -> HashMap<String, ConnectorState> {
        let feeds = self.feeds.read().await;
        feeds
            .iter()
            .map(|(id, feed)| (id.clone(), feed.state()))
            .collect()
    }

    /// Spawns a supervised task per feed into `tasks`.
    pub async fn spawn_all(
        &self,
        store: &Arc<QuoteStore>,
        shutdown: &broadcast::Sender<()>,
        tasks: &mut JoinSet<()>,
    ) -> usize {
        let feeds = self.feeds.read().await;
        for feed in feeds.values() {
            let feed = Arc::clone(feed);
            let store = Arc::clone(store);
            let shutdown = shutdown.subscribe();
            tasks.spawn(supervise(feed, store, shutdown));
        }
        feeds.len()
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a feed until shutdown, restarting it after failed connects and
/// server-side closes.
async fn supervise(
    feed: Arc<dyn FeedSource>,
    store: Arc<QuoteStore>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let id = feed.id();
    loop {
        let exit = feed.run(Arc::clone(&store), &mut shutdown).await;
        let reason = match exit {
            FeedExit::Shutdown => break,
            FeedExit::ClosedByPeer => "closed by peer".to_string(),
            FeedExit::ConnectFailed(e) => e,
        };

        let delay = feed.retry_delay();
        warn!(feed = %id, %reason, ?delay, "feed stopped, restarting");

        tokio::select! {
            _ = shutdown.recv() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    info!(feed = %id, "feed task finished");
}
