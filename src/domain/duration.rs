//! Human-readable motion durations: "45s", "30m", "2h", "1d".

use crate::domain::DomainError;
use chrono::Duration;

pub fn parse_duration(spec: &str) -> Result<Duration, DomainError> {
    let spec = spec.trim();
    let invalid = || DomainError::InvalidDuration(format!("'{}' (expected e.g. 30m, 2h, 1d)", spec));

    let unit = spec.chars().last().ok_or_else(invalid)?;
    let digits = &spec[..spec.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let value: i64 = digits.parse().map_err(|_| invalid())?;

    let duration = match unit {
        's' => Duration::try_seconds(value),
        'm' => Duration::try_minutes(value),
        'h' => Duration::try_hours(value),
        'd' => Duration::try_days(value),
        _ => None,
    };
    duration.ok_or_else(invalid)
}
