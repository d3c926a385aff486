use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as milliseconds since the Unix epoch. Records store
/// timestamps as plain `i64`s rather than `SystemTime` so they stay cheap to
/// load/store atomically.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
