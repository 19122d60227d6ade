//! Live WebSocket feed for one venue and one pair.
//!
//! The connector walks an explicit state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Subscribed -> Streaming
//!                     ^                           |
//!                     +------ Reconnecting <------+  (abnormal drop)
//! any state -> Closed  (shutdown, normal close, failed connect)
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use super::{ConnectorState, FeedExit, FeedSource, Frame, Venue};
use crate::config::WebSocketConfig;
use crate::domain::{Quote, QuoteSource, TradingPair};
use crate::market::QuoteStore;

/// Default interval to send keep-alive messages.
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);

/// Default delay before reconnecting.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Time allowed for the close handshake on shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Connection timing for a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Interval between keep-alive messages.
    pub ping_interval: Duration,
    /// Delay before attempting reconnection.
    pub reconnect_delay: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ConnectorConfig {
    /// Applies the non-zero values of an exchange's `websocket` section.
    pub fn from_config(ws: Option<&WebSocketConfig>) -> Self {
        let mut config = Self::default();
        if let Some(ws) = ws {
            if !ws.ping_interval.is_zero() {
                config.ping_interval = ws.ping_interval;
            }
            if !ws.reconnect_delay.is_zero() {
                config.reconnect_delay = ws.reconnect_delay;
            }
        }
        config
    }
}

/// How a streaming session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    ClosedByPeer,
    Dropped(String),
}

/// Connector streams one venue's top of book for one pair into the store.
pub struct Connector {
    venue: Arc<dyn Venue>,
    pair: TradingPair,
    symbol: String,
    config: ConnectorConfig,
    state: watch::Sender<ConnectorState>,
}

impl Connector {
    pub fn new(venue: Arc<dyn Venue>, pair: TradingPair, config: ConnectorConfig) -> Self {
        let symbol = venue.format_symbol(&pair);
        let (state, _) = watch::channel(ConnectorState::Disconnected);
        Self {
            venue,
            pair,
            symbol,
            config,
            state,
        }
    }

    /// Venue-native symbol the connector subscribes to.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Returns a receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectorState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConnectorState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(
                venue = self.venue.name(),
                pair = %self.pair,
                from = %previous,
                to = %state,
                "connector state changed"
            );
        }
    }

    fn quote(&self, bid: Decimal, ask: Decimal, source: QuoteSource) -> Quote {
        Quote {
            venue: self.venue.name().to_string(),
            symbol: self.symbol.clone(),
            pair: self.pair.clone(),
            bid,
            ask,
            observed_at: Utc::now(),
            source,
        }
    }

    async fn publish_fallback(&self, store: &QuoteStore) {
        let (bid, ask) = self.venue.fallback_prices();
        warn!(
            venue = self.venue.name(),
            pair = %self.pair,
            %bid,
            %ask,
            "publishing fallback quote"
        );
        store.put(self.quote(bid, ask, QuoteSource::Fallback)).await;
    }

    async fn connect(&self) -> Result<(WsSink, WsSource), WsError> {
        info!(venue = self.venue.name(), url = self.venue.url(), "connecting to websocket");
        let (ws_stream, _response) = connect_async(self.venue.url()).await?;
        info!(venue = self.venue.name(), "websocket connected");
        Ok(ws_stream.split())
    }

    async fn subscribe(&self, sink: &mut WsSink) -> Result<(), WsError> {
        let msg = self.venue.subscribe_message(&self.symbol);
        sink.send(WsMessage::text(msg.to_string())).await?;
        info!(venue = self.venue.name(), symbol = %self.symbol, "subscription sent");
        Ok(())
    }

    /// Reads frames until shutdown or the connection ends.
    async fn stream(
        &self,
        sink: &mut WsSink,
        source: &mut WsSource,
        store: &QuoteStore,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> SessionEnd {
        let ping_message = self.venue.ping_message().map(|msg| msg.to_string());
        let mut ping = ping_message.as_ref().map(|_| {
            let period = self.config.ping_interval;
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                _ = shutdown.recv() => return SessionEnd::Shutdown,
                _ = next_tick(&mut ping) => {
                    if let Some(msg) = &ping_message {
                        if let Err(e) = sink.send(WsMessage::text(msg.clone())).await {
                            return SessionEnd::Dropped(format!("ping failed: {}", e));
                        }
                        trace!(venue = self.venue.name(), "ping sent");
                    }
                }
                msg = source.next() => match msg {
                    Some(Ok(WsMessage::Text(text))) => self.handle_text(text.as_str(), store).await,
                    Some(Ok(WsMessage::Close(frame))) => return close_outcome(frame.as_ref()),
                    Some(Ok(_)) => {
                        // Ping, Pong, Binary
                    }
                    Some(Err(e)) => return error_outcome(e),
                    None => return SessionEnd::Dropped("stream ended".into()),
                },
            }
        }
    }

    async fn handle_text(&self, text: &str, store: &QuoteStore) {
        match self.venue.parse(text) {
            Ok(Frame::Ticker { bid, ask }) => {
                store.put(self.quote(bid, ask, QuoteSource::Live)).await;

                let first = *self.state.borrow() != ConnectorState::Streaming;
                if first {
                    info!(venue = self.venue.name(), pair = %self.pair, %bid, %ask, "first quote received");
                    self.set_state(ConnectorState::Streaming);
                }
            }
            Ok(Frame::Ignored(reason)) => {
                trace!(venue = self.venue.name(), %reason, "frame ignored");
            }
            Ok(Frame::Rejected(reason)) => {
                warn!(venue = self.venue.name(), symbol = %self.symbol, %reason, "subscription rejected");
            }
            Err(e) => {
                warn!(venue = self.venue.name(), error = %e, "failed to parse message");
                debug!(venue = self.venue.name(), raw = text, "unparsed message");
            }
        }
    }

    async fn close(&self, sink: &mut WsSink) {
        match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(venue = self.venue.name(), error = %e, "failed to close websocket"),
            Err(_) => debug!(venue = self.venue.name(), "websocket close timed out"),
        }
    }
}

#[async_trait]
impl FeedSource for Connector {
    fn venue(&self) -> &str {
        self.venue.name()
    }

    fn pair(&self) -> &TradingPair {
        &self.pair
    }

    fn state(&self) -> ConnectorState {
        *self.state.borrow()
    }

    fn retry_delay(&self) -> Duration {
        self.config.reconnect_delay
    }

    async fn run(&self, store: Arc<QuoteStore>, shutdown: &mut broadcast::Receiver<()>) -> FeedExit {
        loop {
            self.set_state(ConnectorState::Connecting);

            let connected = tokio::select! {
                _ = shutdown.recv() => {
                    self.set_state(ConnectorState::Closed);
                    return FeedExit::Shutdown;
                }
                result = self.connect() => result,
            };

            let (mut sink, mut source) = match connected {
                Ok(halves) => halves,
                Err(e) => {
                    error!(
                        venue = self.venue.name(),
                        url = self.venue.url(),
                        error = %e,
                        "failed to connect to websocket"
                    );
                    self.publish_fallback(&store).await;
                    self.set_state(ConnectorState::Closed);
                    return FeedExit::ConnectFailed(e.to_string());
                }
            };

            let end = match self.subscribe(&mut sink).await {
                Ok(()) => {
                    self.set_state(ConnectorState::Subscribed);
                    self.stream(&mut sink, &mut source, &store, shutdown).await
                }
                Err(e) => SessionEnd::Dropped(format!("subscribe failed: {}", e)),
            };

            match end {
                SessionEnd::Shutdown => {
                    self.close(&mut sink).await;
                    self.set_state(ConnectorState::Closed);
                    info!(venue = self.venue.name(), pair = %self.pair, "connector stopped");
                    return FeedExit::Shutdown;
                }
                SessionEnd::ClosedByPeer => {
                    info!(venue = self.venue.name(), pair = %self.pair, "websocket closed by server");
                    self.set_state(ConnectorState::Closed);
                    return FeedExit::ClosedByPeer;
                }
                SessionEnd::Dropped(reason) => {
                    warn!(
                        venue = self.venue.name(),
                        pair = %self.pair,
                        %reason,
                        delay = ?self.config.reconnect_delay,
                        "connection lost, reconnecting"
                    );
                    drop(sink);
                    drop(source);
                    self.set_state(ConnectorState::Reconnecting);

                    tokio::select! {
                        _ = shutdown.recv() => {
                            self.set_state(ConnectorState::Closed);
                            return FeedExit::Shutdown;
                        }
                        _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                    }
                }
            }
        }
    }
}

/// Waits for the next keep-alive tick; never resolves without an interval.
async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Only a close frame with the normal status code is a clean close.
fn close_outcome(frame: Option<&CloseFrame>) -> SessionEnd {
    match frame {
        Some(frame) if frame.code == CloseCode::Normal => SessionEnd::ClosedByPeer,
        Some(frame) => SessionEnd::Dropped(format!(
            "closed with code {}: {}",
            u16::from(frame.code),
            frame.reason.as_str()
        )),
        None => SessionEnd::Dropped("closed without status".into()),
    }
}

fn error_outcome(error: WsError) -> SessionEnd {
    match error {
        WsError::ConnectionClosed => SessionEnd::ClosedByPeer,
        other => SessionEnd::Dropped(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::{Binance, Poloniex};
    use rust_decimal_macros::dec;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use tokio_tungstenite::accept_async;

    const BOOK_TICKER: &str =
        r#"{"u":400900217,"s":"BTCUSDT","b":"69000.10","B":"31.21","a":"69000.20","A":"40.66"}"#;

    fn fast_config() -> ConnectorConfig {
        ConnectorConfig {
            ping_interval: Duration::from_secs(20),
            reconnect_delay: Duration::from_millis(50),
        }
    }

    fn binance_connector(url: &str) -> Arc<Connector> {
        Arc::new(Connector::new(
            Arc::new(Binance::with_url(url)),
            TradingPair::new("BTC", "USDT"),
            fast_config(),
        ))
    }

    fn spawn_run(
        connector: &Arc<Connector>,
        store: &Arc<QuoteStore>,
        shutdown: &broadcast::Sender<()>,
    ) -> JoinHandle<FeedExit> {
        let connector = Arc::clone(connector);
        let store = Arc::clone(store);
        let mut rx = shutdown.subscribe();
        tokio::spawn(async move { connector.run(store, &mut rx).await })
    }

    async fn wait_for_quote(store: &QuoteStore) -> Quote {
        let pair = TradingPair::new("BTC", "USDT");
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(quote) = store.get("binance", &pair).await {
                    return quote;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("no quote published")
    }

    #[test]
    fn test_config_defaults_and_overrides() {
        assert_eq!(ConnectorConfig::from_config(None), ConnectorConfig::default());

        let ws = WebSocketConfig {
            url: None,
            ping_interval: Duration::ZERO,
            reconnect_delay: Duration::from_secs(2),
        };
        let config = ConnectorConfig::from_config(Some(&ws));
        assert_eq!(config.ping_interval, DEFAULT_PING_INTERVAL);
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_close_outcome() {
        let normal = CloseFrame {
            code: CloseCode::Normal,
            reason: String::from("bye").into(),
        };
        assert_eq!(close_outcome(Some(&normal)), SessionEnd::ClosedByPeer);

        let away = CloseFrame {
            code: CloseCode::Away,
            reason: String::new().into(),
        };
        assert!(matches!(close_outcome(Some(&away)), SessionEnd::Dropped(_)));
        assert!(matches!(close_outcome(None), SessionEnd::Dropped(_)));
    }

    #[test]
    fn test_error_outcome() {
        assert_eq!(error_outcome(WsError::ConnectionClosed), SessionEnd::ClosedByPeer);
        assert!(matches!(
            error_outcome(WsError::AlreadyClosed),
            SessionEnd::Dropped(_)
        ));
    }

    #[test]
    fn test_new_connector_state() {
        let connector = Connector::new(
            Arc::new(Poloniex::new()),
            TradingPair::new("ETH", "USDT"),
            ConnectorConfig::default(),
        );
        assert_eq!(connector.state(), ConnectorState::Disconnected);
        assert_eq!(connector.symbol(), "ETH_USDT");
        assert_eq!(connector.id(), "poloniex:ETH/USDT");
    }

    #[tokio::test]
    async fn test_streams_quotes_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            let subscription = ws.next().await.unwrap().unwrap();
            ws.send(WsMessage::text(r#"{"result":null,"id":1}"#.to_string()))
                .await
                .unwrap();
            ws.send(WsMessage::text(BOOK_TICKER.to_string())).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
            subscription.to_text().unwrap().to_string()
        });

        let connector = binance_connector(&format!("ws://{}", addr));
        let mut states = connector.subscribe_state();
        let store = Arc::new(QuoteStore::new());
        let (shutdown, _) = broadcast::channel(1);
        let handle = spawn_run(&connector, &store, &shutdown);

        let quote = wait_for_quote(&store).await;
        assert_eq!(quote.bid, dec!(69000.10));
        assert_eq!(quote.ask, dec!(69000.20));
        assert_eq!(quote.symbol, "BTCUSDT");
        assert_eq!(quote.source, QuoteSource::Live);

        tokio::time::timeout(
            Duration::from_secs(5),
            states.wait_for(|s| *s == ConnectorState::Streaming),
        )
        .await
        .unwrap()
        .unwrap();

        shutdown.send(()).unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, FeedExit::Shutdown);
        assert_eq!(connector.state(), ConnectorState::Closed);

        let subscription = server.await.unwrap();
        assert!(subscription.contains("btcusdt@bookTicker"));
    }

    #[tokio::test]
    async fn test_connect_failure_publishes_fallback() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = binance_connector(&format!("ws://{}", addr));
        let store = Arc::new(QuoteStore::new());
        let (shutdown, _) = broadcast::channel(1);

        let exit = tokio::time::timeout(
            Duration::from_secs(5),
            spawn_run(&connector, &store, &shutdown),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(matches!(exit, FeedExit::ConnectFailed(_)));
        assert_eq!(connector.state(), ConnectorState::Closed);

        let quote = store
            .get("binance", &TradingPair::new("BTC", "USDT"))
            .await
            .unwrap();
        assert_eq!(quote.source, QuoteSource::Fallback);
        assert_eq!((quote.bid, quote.ask), (dec!(69500), dec!(69550)));
        assert!(!quote.is_comparable());
    }

    #[tokio::test]
    async fn test_reconnects_after_abnormal_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // First session: read the subscription, then drop without a close frame.
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.next().await.unwrap().unwrap();
            drop(ws);

            // Second session: serve a quote.
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.next().await.unwrap().unwrap();
            ws.send(WsMessage::text(BOOK_TICKER.to_string())).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let connector = binance_connector(&format!("ws://{}", addr));
        let store = Arc::new(QuoteStore::new());
        let (shutdown, _) = broadcast::channel(1);
        let handle = spawn_run(&connector, &store, &shutdown);

        let quote = wait_for_quote(&store).await;
        assert_eq!(quote.source, QuoteSource::Live);

        shutdown.send(()).unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, FeedExit::Shutdown);
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_normal_close_ends_run() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.next().await.unwrap().unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: String::from("maintenance").into(),
            }))
            .await
            .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let connector = binance_connector(&format!("ws://{}", addr));
        let store = Arc::new(QuoteStore::new());
        let (shutdown, _) = broadcast::channel(1);

        let exit = tokio::time::timeout(
            Duration::from_secs(5),
            spawn_run(&connector, &store, &shutdown),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(exit, FeedExit::ClosedByPeer);
        assert_eq!(connector.state(), ConnectorState::Closed);
        assert!(store.is_empty().await);
    }
}
