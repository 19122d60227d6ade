//! Opportunity sinks and the registry that fans events out to them.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::domain::OpportunityEvent;

/// Capacity of the in-process opportunity broadcast.
const BROADCAST_CAPACITY: usize = 256;

/// Error returned by a sink for one event.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The sink's queue is full or closed.
    #[error("queue unavailable: {0}")]
    Queue(String),
}

/// OpportunitySink receives every detected opportunity.
///
/// `handle` runs on the detection task, so implementations must not block
/// for long: slow work belongs on a queue drained elsewhere.
pub trait OpportunitySink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn handle(&self, event: &OpportunityEvent) -> Result<(), SinkError>;
}

/// SinkRegistry dispatches events to sinks in registration order.
///
/// A failing or panicking sink is logged and skipped; the remaining sinks
/// still receive the event.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: RwLock<Vec<Arc<dyn OpportunitySink>>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sink. Events raised afterwards reach it.
    pub fn register(&self, sink: Arc<dyn OpportunitySink>) {
        info!(sink = sink.name(), "Registering opportunity sink");
        match self.sinks.write() {
            Ok(mut sinks) => sinks.push(sink),
            Err(poisoned) => poisoned.into_inner().push(sink),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn OpportunitySink>> {
        match self.sinks.read() {
            Ok(sinks) => sinks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Calls every sink once, in order. Returns the number of sinks that
    /// handled the event successfully.
    pub fn notify(&self, event: &OpportunityEvent) -> usize {
        let mut delivered = 0;

        // Sinks run outside the lock.
        for sink in self.snapshot() {
            match panic::catch_unwind(AssertUnwindSafe(|| sink.handle(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(sink = sink.name(), error = %e, "opportunity sink failed");
                }
                Err(payload) => {
                    error!(
                        sink = sink.name(),
                        panic = panic_message(payload.as_ref()),
                        "opportunity sink panicked"
                    );
                }
            }
        }

        delivered
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// LogSink writes every opportunity to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl OpportunitySink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn handle(&self, event: &OpportunityEvent) -> Result<(), SinkError> {
        info!(
            pair = %event.pair(),
            buy_venue = %event.buy_venue,
            sell_venue = %event.sell_venue,
            buy_price = %event.buy_price,
            sell_price = %event.sell_price,
            profit_percent = %event.profit_percent.round_dp(4),
            net_profit = %event.net_profit.round_dp(4),
            "ARBITRAGE OPPORTUNITY DETECTED"
        );
        Ok(())
    }
}

/// BroadcastSink republishes opportunities to in-process subscribers,
/// e.g. a dashboard pushing them to browsers.
pub struct BroadcastSink {
    sender: broadcast::Sender<OpportunityEvent>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Returns a receiver for events raised from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<OpportunityEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OpportunitySink for BroadcastSink {
    fn name(&self) -> &str {
        "broadcast"
    }

    fn handle(&self, event: &OpportunityEvent) -> Result<(), SinkError> {
        // No subscribers is fine.
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}
