//! Configuration loading and validation.
//!
//! Uses serde_yaml to load YAML configuration files, with Telegram credentials
//! taken from environment variables (optionally via a `.env` file).

mod app;
mod arbitrage;
mod duration;
mod error;
mod exchange;
mod notification;
mod simulation;
mod storage;

pub use app::AppConfig;
pub use arbitrage::ArbitrageConfig;
pub use error::ConfigError;
pub use exchange::{ExchangeConfig, FeedKind, WebSocketConfig};
pub use notification::{NotificationConfig, TelegramConfig};
pub use simulation::SimulationConfig;
pub use storage::StorageConfig;

use rust_decimal::Decimal;
use serde::Deserialize;
use std::{collections::HashMap, env, fs, str::FromStr};

use crate::domain::{FeeTable, TradingPair};
use crate::exchanges;

/// Threshold used when `arbitrage.min_profit_threshold` is not set (0.1%).
pub const DEFAULT_MIN_PROFIT_THRESHOLD: &str = "0.001";

/// Root configuration structure.
///
/// Required sections: app, exchanges, pairs.
/// Optional sections: arbitrage, simulation, storage, notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    /// Maps exchange names to their configurations.
    pub exchanges: HashMap<String, ExchangeConfig>,
    /// Detection thresholds and cadences (optional).
    pub arbitrage: Option<ArbitrageConfig>,
    /// Synthetic feed settings (optional).
    pub simulation: Option<SimulationConfig>,
    /// Trading pairs to monitor (e.g., "BTC/USDT").
    pub pairs: Vec<String>,
    /// Opportunity CSV log (optional).
    pub storage: Option<StorageConfig>,
    /// Alert channels like Telegram (optional).
    pub notification: Option<NotificationConfig>,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Loads `.env` first (if present), then the YAML file, then Telegram
    /// credentials from `TELEGRAM_BOT_TOKEN` and `TELEGRAM_CHAT_ID`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;

        config.load_credentials_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load credentials from environment variables.
    fn load_credentials_from_env(&mut self) {
        if let Some(telegram) = self
            .notification
            .as_mut()
            .and_then(|n| n.telegram.as_mut())
        {
            if telegram.enabled {
                telegram.bot_token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
                telegram.chat_id = env::var("TELEGRAM_CHAT_ID").unwrap_or_default();
            }
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        if self.pairs.is_empty() {
            return Err(ConfigError::Validation(
                "at least one trading pair is required".into(),
            ));
        }

        self.trading_pairs()?;

        let mut enabled_exchanges = 0;
        let mut seen = std::collections::HashSet::new();
        for (name, exchange) in &self.exchanges {
            if !exchange.enabled {
                continue;
            }
            enabled_exchanges += 1;

            if !seen.insert(name.to_lowercase()) {
                return Err(ConfigError::Validation(format!(
                    "exchange {}: configured more than once",
                    name
                )));
            }

            if !exchanges::is_supported(name) {
                return Err(ConfigError::Validation(format!(
                    "exchange {}: unsupported venue (supported: {})",
                    name,
                    exchanges::SUPPORTED_VENUES.join(", ")
                )));
            }

            match exchange.fee_taker.as_deref() {
                None => {
                    return Err(ConfigError::Validation(format!(
                        "exchange {}: fee_taker is required",
                        name
                    )));
                }
                Some(fee) => {
                    parse_decimal(fee, &format!("exchange {}: fee_taker", name))?;
                }
            }
        }

        if enabled_exchanges == 0 {
            return Err(ConfigError::Validation(
                "at least one exchange must be enabled".into(),
            ));
        }

        self.min_profit_threshold()?;

        Ok(())
    }

    /// Returns the monitored pairs, parsed.
    pub fn trading_pairs(&self) -> Result<Vec<TradingPair>, ConfigError> {
        self.pairs
            .iter()
            .map(|p| {
                TradingPair::from_str(p).map_err(ConfigError::Validation)
            })
            .collect()
    }

    /// Returns the lowercase names of enabled exchanges, sorted.
    pub fn enabled_exchanges(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .exchanges
            .iter()
            .filter(|(_, ex)| ex.enabled)
            .map(|(name, _)| name.to_lowercase())
            .collect();
        names.sort();
        names
    }

    /// Builds the taker fee table of enabled exchanges, keyed by the
    /// lowercase venue name feeds publish under.
    pub fn fee_table(&self) -> Result<FeeTable, ConfigError> {
        self.exchanges
            .iter()
            .filter(|(_, ex)| ex.enabled)
            .map(|(name, ex)| {
                let fee = ex.fee_taker.as_deref().unwrap_or("0");
                let fee = parse_decimal(fee, &format!("exchange {}: fee_taker", name))?;
                Ok((name.to_lowercase(), fee))
            })
            .collect()
    }

    /// Returns the minimum profit threshold as a decimal fraction.
    pub fn min_profit_threshold(&self) -> Result<Decimal, ConfigError> {
        let raw = self
            .arbitrage
            .as_ref()
            .and_then(|a| a.min_profit_threshold.as_deref())
            .unwrap_or(DEFAULT_MIN_PROFIT_THRESHOLD);
        parse_decimal(raw, "arbitrage.min_profit_threshold")
    }
}

fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, ConfigError> {
    let value = Decimal::from_str(raw.trim())
        .map_err(|e| ConfigError::Validation(format!("{}: invalid decimal {:?}: {}", field, raw, e)))?;
    if value.is_sign_negative() {
        return Err(ConfigError::Validation(format!("{} must not be negative", field)));
    }
    Ok(value)
}
