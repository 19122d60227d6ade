mod bot;
mod config;
mod detector;
mod domain;
mod exchanges;
mod market;
mod notification;
mod storage;

use bot::Bot;
use config::Config;
use std::env;
use std::process;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

fn parse_config_path() -> String {
    for arg in env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

/// Returns the filter directive for `app.log_level`, "info" when unset.
fn filter_directive(log_level: Option<&str>) -> &str {
    match log_level.map(str::trim) {
        Some("warning") => "warn",
        Some(level) if !level.is_empty() => level,
        _ => "info",
    }
}

fn init_tracing(log_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[tokio::main]
async fn main() {
    let config_path = parse_config_path();

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config {}: {}", config_path, e);
            process::exit(1);
        }
    };

    init_tracing(config.app.log_level.as_deref());

    let bot = match Bot::new(bot::BotConfig::new(config)).await {
        Ok(bot) => bot,
        Err(e) => {
            error!(error = %e, "Failed to create bot");
            process::exit(1);
        }
    };

    info!(config = %config_path, "Bot initialized");

    if let Err(e) = bot.start().await {
        error!(error = %e, "Bot error");
        process::exit(1);
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }

    if let Err(e) = bot.stop("User requested").await {
        error!(error = %e, "Failed to stop bot");
    }
}
