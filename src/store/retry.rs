//! Bounded retry policy for tile writes.

use std::time::Duration;

/// Backoff schedule for failed tile writes.
///
/// The default retries 6 times, sleeping 50ms before the first retry and
/// doubling each time (50, 100, 200, 400, 800, 1600ms — about 3.15s in
/// total before the write is abandoned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,
    /// Sleep before the first retry; doubles on each subsequent retry
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 6,
            initial_backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Backoff to sleep before retry number `retry` (zero-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        self.initial_backoff * (1u32 << retry)
    }
}

/// Sleep abstraction so tests can observe the backoff schedule instead of
/// actually waiting.
pub trait Sleeper: Send + Sync {
    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by [`std::thread::sleep`].
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
