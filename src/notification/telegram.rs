//! Telegram alerts through the Bot API.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::format::{format_opportunity, format_shutdown, format_startup, ShutdownData, StartupData};
use super::sink::{OpportunitySink, SinkError};
use super::NotificationError;
use crate::domain::OpportunityEvent;

const TELEGRAM_API_URL: &str = "https://api.telegram.org/bot";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_MESSAGE_LENGTH: usize = 4096;
const ASYNC_QUEUE_SIZE: usize = 100;

/// Time allowed for queued messages to drain on close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Telegram sink settings.
#[derive(Debug, Clone)]
pub struct TelegramSettings {
    /// Token from BotFather.
    pub bot_token: String,
    pub chat_id: String,
    /// Send an alert for every opportunity.
    pub notify_opportunities: bool,
    /// Send startup and shutdown notices.
    pub notify_lifecycle: bool,
}

impl TelegramSettings {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            notify_opportunities: true,
            notify_lifecycle: true,
        }
    }
}

/// TelegramSink queues formatted messages for a background worker that posts
/// them to the Bot API. `handle` never waits on the network.
pub struct TelegramSink {
    settings: TelegramSettings,
    sender: Mutex<Option<mpsc::Sender<String>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TelegramSink {
    /// Creates the sink and spawns its worker. Must be called inside a tokio runtime.
    pub fn new(settings: TelegramSettings) -> Result<Self, NotificationError> {
        Self::with_api_url(settings, TELEGRAM_API_URL)
    }

    fn with_api_url(settings: TelegramSettings, base_url: &str) -> Result<Self, NotificationError> {
        if settings.bot_token.is_empty() {
            return Err(NotificationError::MissingSetting("bot_token"));
        }
        if settings.chat_id.is_empty() {
            return Err(NotificationError::MissingSetting("chat_id"));
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::Http(e.to_string()))?;

        let api_url = format!("{}{}", base_url, settings.bot_token);
        let (sender, receiver) = mpsc::channel(ASYNC_QUEUE_SIZE);
        let worker = Self::spawn_worker(receiver, http_client, api_url, settings.chat_id.clone());

        Ok(Self {
            settings,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    fn spawn_worker(
        mut receiver: mpsc::Receiver<String>,
        http_client: reqwest::Client,
        api_url: String,
        chat_id: String,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(text) = receiver.recv().await {
                if let Err(e) = send_message(&http_client, &api_url, &chat_id, &text).await {
                    error!(error = %e, "Failed to send Telegram message");
                }
            }
            debug!("Telegram worker stopped");
        })
    }

    /// Queues a message without waiting.
    fn enqueue(&self, text: String) -> Result<(), NotificationError> {
        let guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let sender = guard.as_ref().ok_or(NotificationError::Closed)?;
        sender
            .try_send(text)
            .map_err(|e| NotificationError::Queue(e.to_string()))
    }

    pub fn notify_startup(&self, data: &StartupData) {
        if !self.settings.notify_lifecycle {
            return;
        }
        if let Err(e) = self.enqueue(format_startup(data)) {
            warn!(error = %e, "Failed to queue Telegram startup notice");
        }
    }

    pub fn notify_shutdown(&self, data: &ShutdownData) {
        if !self.settings.notify_lifecycle {
            return;
        }
        if let Err(e) = self.enqueue(format_shutdown(data)) {
            warn!(error = %e, "Failed to queue Telegram shutdown notice");
        }
    }

    /// Stops accepting messages and waits for the queue to drain.
    pub async fn close(&self) {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(worker) = worker {
            if tokio::time::timeout(CLOSE_TIMEOUT, worker).await.is_err() {
                warn!("Telegram queue did not drain before close timeout");
            }
        }
    }
}

impl OpportunitySink for TelegramSink {
    fn name(&self) -> &str {
        "telegram"
    }

    fn handle(&self, event: &OpportunityEvent) -> Result<(), SinkError> {
        if !self.settings.notify_opportunities {
            return Ok(());
        }
        self.enqueue(format_opportunity(event))
            .map_err(|e| SinkError::Queue(e.to_string()))
    }
}

async fn send_message(
    http_client: &reqwest::Client,
    api_url: &str,
    chat_id: &str,
    text: &str,
) -> Result<(), NotificationError> {
    let text = truncate(text, MAX_MESSAGE_LENGTH);
    let url = format!("{}/sendMessage", api_url);

    let payload = serde_json::json!({
        "chat_id": chat_id,
        "text": text,
        "parse_mode": "Markdown"
    });

    let response = http_client
        .post(&url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| NotificationError::Http(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(NotificationError::Api(format!("{} - {}", status, body)));
    }

    Ok(())
}

/// Cuts `text` to at most `max` bytes on a char boundary.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
