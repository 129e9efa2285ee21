//! Reconnect backoff schedule shared by all feed adapters.
//!
//! The n-th delay in a failure streak is `min(1000 · 2^(n-1), 30000)` ms.
//! After [`MAX_CONSECUTIVE_FAILURES`] failed attempts the adapter stops
//! retrying and surfaces `FeedDown`.

use std::time::Duration;

/// First reconnect delay after a disconnect.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Backoff ceiling.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Consecutive connect failures tolerated before giving up.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Delay before the `failure_streak`-th reconnect attempt (1-based).
pub fn backoff_delay(failure_streak: u32) -> Duration {
    let n = failure_streak.max(1);
    // Shift capped so the doubling cannot overflow before min() applies.
    let ms = INITIAL_BACKOFF_MS << (n - 1).min(15);
    Duration::from_millis(ms.min(MAX_BACKOFF_MS))
}
