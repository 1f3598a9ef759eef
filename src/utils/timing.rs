// src/utils/timing.rs

use chrono::{DateTime, Utc};

use crate::models::test_instance::TimingMode;

/// Seconds left on a test, computed from the stored creation time.
///
/// Returns `None` for untimed tests. Never negative.
pub fn remaining_seconds(
    mode: TimingMode,
    duration_seconds: i64,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<i64> {
    if !mode.is_timed() {
        return None;
    }
    let elapsed = elapsed_seconds(created_at, now);
    Some((duration_seconds - elapsed).max(0))
}

/// Whole seconds between creation and `now`, zero if the clock went backwards.
pub fn elapsed_seconds(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at).num_seconds().max(0)
}

/// Time recorded on completion. Timed tests cannot take longer than their duration.
pub fn time_taken(
    mode: TimingMode,
    duration_seconds: i64,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> i64 {
    let elapsed = elapsed_seconds(created_at, now);
    if mode.is_timed() {
        elapsed.min(duration_seconds)
    } else {
        elapsed
    }
}
