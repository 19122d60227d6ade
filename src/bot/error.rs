//! Bot error types.

use crate::config::ConfigError;
use crate::exchanges::FeedError;
use crate::storage::StorageError;

/// Bot error type.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("bot is already running")]
    AlreadyRunning,
    #[error("bot is not running")]
    NotRunning,
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
