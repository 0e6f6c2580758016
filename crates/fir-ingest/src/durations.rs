//! Duration arithmetic for correlated timestamp pairs. All endpoints are
//! reduced to whole Unix seconds before subtracting; the reporting model
//! never sees sub-second precision.

use chrono::{DateTime, Utc};

/// Whole seconds between two instants, sub-second components dropped on
/// both endpoints before subtracting.
pub fn duration_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    end.timestamp() - start.timestamp()
}

/// Talk time for a completed reservation. A wrap-up event ends the talking
/// phase when one exists; otherwise the completion itself does.
pub fn talk_time(
    accepted: DateTime<Utc>,
    wrapup: Option<DateTime<Utc>>,
    completed: DateTime<Utc>,
) -> i64 {
    match wrapup {
        Some(wrapup) => duration_seconds(accepted, wrapup),
        None => duration_seconds(accepted, completed),
    }
}

/// Wrap-up time for a completed reservation. No wrap-up event means the
/// reservation spent exactly zero seconds in wrap-up.
pub fn wrapup_time(wrapup: Option<DateTime<Utc>>, completed: DateTime<Utc>) -> i64 {
    match wrapup {
        Some(wrapup) => duration_seconds(wrapup, completed),
        None => 0,
    }
}
