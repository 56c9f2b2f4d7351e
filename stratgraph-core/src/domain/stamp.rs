//! `lastUpdated` stamping.

use chrono::Utc;

/// Next `lastUpdated` value for a record last stamped at `previous`.
///
/// Stamps are milliseconds since the epoch and strictly increase per record,
/// even when several edits land within the same millisecond or the wall clock
/// steps backwards.
pub fn next_stamp(previous: i64) -> i64 {
    next_stamp_at(previous, Utc::now().timestamp_millis())
}

pub fn next_stamp_at(previous: i64, now_ms: i64) -> i64 {
    now_ms.max(previous.saturating_add(1))
}
