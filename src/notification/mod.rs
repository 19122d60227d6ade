//! Opportunity fan-out and alerting.
//!
//! The detector hands every opportunity to a [`SinkRegistry`], which calls
//! each registered [`OpportunitySink`] in order: the log, the in-process
//! broadcast, the CSV log and Telegram.

mod format;
mod sink;
mod telegram;

pub use format::{format_opportunity, format_shutdown, format_startup, ShutdownData, StartupData};
pub use sink::{BroadcastSink, LogSink, OpportunitySink, SinkError, SinkRegistry};
pub use telegram::{TelegramSettings, TelegramSink};

use thiserror::Error;

/// Notification errors.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("{0} is required")]
    MissingSetting(&'static str),

    #[error("http request failed: {0}")]
    Http(String),

    #[error("telegram api error: {0}")]
    Api(String),

    #[error("failed to queue message: {0}")]
    Queue(String),

    #[error("notifier is closed")]
    Closed,
}
