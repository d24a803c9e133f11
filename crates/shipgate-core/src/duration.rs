//! Human duration strings used throughout shipgate.toml.

use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Parse a duration string like "500ms", "15s", "2m", "1h".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> ConfigResult<Duration> {
    let trimmed = s.trim();
    let invalid = || ConfigError::Duration(s.to_string());

    let (digits, unit_millis) = if let Some(ms) = trimmed.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(secs) = trimmed.strip_suffix('s') {
        (secs, 1_000)
    } else if let Some(mins) = trimmed.strip_suffix('m') {
        (mins, 60_000)
    } else if let Some(hours) = trimmed.strip_suffix('h') {
        (hours, 3_600_000)
    } else {
        (trimmed, 1_000)
    };

    let value: u64 = digits.trim().parse().map_err(|_| invalid())?;
    value
        .checked_mul(unit_millis)
        .map(Duration::from_millis)
        .ok_or_else(invalid)
}
