//! Serde helper for duration strings like "500ms", "5s", "1m".
//!
//! A missing or empty value deserializes to `Duration::ZERO`, which callers
//! treat as "use the default".

use serde::{self, Deserialize, Deserializer};
use std::time::Duration;

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    s.map_or(Ok(Duration::ZERO), |s| {
        parse_duration(&s).map_err(serde::de::Error::custom)
    })
}

/// Parses a number followed by an optional unit (ms, s, m, h). A bare number is seconds.
pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Duration::ZERO);
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (value, unit) = s.split_at(split);

    let value: f64 = value
        .parse()
        .map_err(|_| format!("invalid duration number: {}", value))?;

    let seconds = match unit.trim() {
        "ms" => value / 1_000.0,
        "s" | "" => value,
        "m" => value * 60.0,
        "h" => value * 3_600.0,
        other => return Err(format!("unknown duration unit: {}", other)),
    };

    Duration::try_from_secs_f64(seconds).map_err(|e| format!("invalid duration {:?}: {}", s, e))
}
