//! Timestamp utilities
//!
//! Persisted timestamps are milliseconds since the Unix epoch so that the
//! storage layer can do arithmetic on them directly.

use chrono::{DateTime, TimeZone, Utc};

/// Current UTC timestamp, truncated to milliseconds
///
/// Truncation keeps in-memory values equal to what the storage layer reads back.
pub fn now() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}

/// Milliseconds since the Unix epoch
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Timestamp from milliseconds since the Unix epoch
///
/// Out-of-range values fall back to the epoch.
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}

/// Convert signed milliseconds to a duration, clamping negatives to zero
pub fn millis_to_duration(millis: i64) -> std::time::Duration {
    std::time::Duration::from_millis(millis.max(0) as u64)
}
