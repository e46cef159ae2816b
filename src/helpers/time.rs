use chrono::{DateTime, Duration, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn now_i64() -> i64 {
    now().timestamp()
}

/// Absolute expiry for a server-asserted lifetime in seconds.
pub fn expires_at_from(expires_in_secs: u64) -> DateTime<Utc> {
    let secs = i64::try_from(expires_in_secs).unwrap_or(i64::MAX);
    Duration::try_seconds(secs)
        .and_then(|lifetime| now().checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// True when `expires_at` falls inside the safety margin (or is already past).
pub fn is_within_margin(expires_at: DateTime<Utc>, safety_margin_seconds: u64) -> bool {
    let margin = i64::try_from(safety_margin_seconds).unwrap_or(i64::MAX);
    expires_at.timestamp().saturating_sub(margin) <= now_i64()
}
