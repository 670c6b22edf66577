//! Timestamp utilities

use chrono::{DateTime, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parse a message timestamp as delivered by mail providers
///
/// Accepts unix seconds (optionally fractional), RFC 2822 `Date:` header
/// values and RFC 3339. Returns `None` for anything else.
pub fn parse_message_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(secs) = raw.parse::<f64>() {
        if secs.is_finite() && secs > 0.0 {
            return Utc.timestamp_opt(secs.trunc() as i64, 0).single();
        }
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    // Some providers append a zone comment: "... +0000 (UTC)"
    if let Some(idx) = raw.rfind(" (") {
        if let Ok(dt) = DateTime::parse_from_rfc2822(&raw[..idx]) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
