//! Telegram message formatting.

use chrono::Utc;
use rust_decimal::Decimal;
use std::time::Duration;

use crate::domain::OpportunityEvent;

/// Startup notice data.
#[derive(Debug, Clone)]
pub struct StartupData {
    pub version: String,
    pub venues: Vec<String>,
    pub pairs: Vec<String>,
    /// Venues fed by the synthetic generator.
    pub simulated: Vec<String>,
    /// Minimum profit threshold as a fraction.
    pub threshold: Decimal,
}

/// Shutdown notice data.
#[derive(Debug, Clone)]
pub struct ShutdownData {
    pub reason: String,
    pub uptime: Duration,
    /// False when some tasks had to be aborted.
    pub graceful: bool,
    pub detection_cycles: u64,
    pub opportunities_detected: u64,
}

/// Formats an arbitrage opportunity.
pub fn format_opportunity(event: &OpportunityEvent) -> String {
    let pair = event.pair().to_string();

    format!(
        "🔔 *Arbitrage opportunity*\n\n\
         💰 Profit: *{:.4}%*\n\
         📈 Net per {}: *{:.2} {}*\n\n\
         Pair: {} #{}\n\
         Buy: {} @ {}\n\
         Sell: {} @ {}\n\n\
         ⏰ {}",
        event.profit_percent.round_dp(4),
        event.base,
        event.net_profit.round_dp(2),
        event.quote,
        pair,
        format_pair_tag(&pair),
        event.buy_venue,
        event.buy_price,
        event.sell_venue,
        event.sell_price,
        event.detected_at.format("%H:%M:%S UTC")
    )
}

/// Formats the startup notice.
pub fn format_startup(data: &StartupData) -> String {
    let mode = if data.simulated.is_empty() {
        "📡 LIVE".to_string()
    } else {
        format!("🧪 SIMULATED ({})", data.simulated.join(", "))
    };

    format!(
        "🤖 *Arbitrage monitor started*\n\n\
         Version: {}\n\
         Mode: {}\n\
         Venues: {}\n\
         Pairs: {}\n\
         Threshold: {}%\n\n\
         ⏰ {}",
        data.version,
        mode,
        data.venues.join(", "),
        data.pairs.join(", "),
        (data.threshold * Decimal::ONE_HUNDRED).normalize(),
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Formats the shutdown notice.
pub fn format_shutdown(data: &ShutdownData) -> String {
    let status = if data.graceful {
        "✅ Graceful"
    } else {
        "⚠️ Forced"
    };

    format!(
        "🛑 *Arbitrage monitor stopped*\n\n\
         Reason: {}\n\
         Status: {}\n\
         Uptime: {}\n\
         🔄 Detection cycles: {}\n\
         📈 Opportunities: {}\n\n\
         ⏰ {}",
        data.reason,
        status,
        format_duration(data.uptime),
        add_thousand_separators(data.detection_cycles),
        add_thousand_separators(data.opportunities_detected),
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Converts a pair to a hashtag (e.g., "BTC/USDT" -> "BTC\_USDT").
/// Underscore escaped for Telegram Markdown compatibility.
pub(crate) fn format_pair_tag(pair: &str) -> String {
    pair.replace('/', "\\_")
}

/// Formats a duration as the two most significant units.
pub(crate) fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Adds thousand separators.
pub(crate) fn add_thousand_separators(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
