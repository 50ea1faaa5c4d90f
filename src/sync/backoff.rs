//! Exponential backoff for Provider (re)initialization retries (§4.4).
//!
//! Tracker for how long the caller should wait between attempts. One instance lives for
//! the life of the SyncController; each attempt reports its outcome back via
//! [`Backoff::record_success`] / [`Backoff::record_failure`].

use std::time::Duration;

const INITIAL_DELAY_MS: u64 = 5_000;

pub struct BackoffOptions {
    pub max_delay_ms: u64,
    /// `None` means unbounded (the spec's default).
    pub max_retries: Option<u32>,
}

impl Default for BackoffOptions {
    fn default() -> Self {
        Self {
            max_delay_ms: 120_000,
            max_retries: None,
        }
    }
}

pub enum NextAttempt {
    /// Schedule a retry after this delay.
    RetryAfter(Duration),
    /// `max_retries` has been exhausted; stop scheduling retries entirely.
    Exhausted,
}

/// Doubling backoff: 5s, 10s, 20s, 40s, 80s, ... clamped to `max_delay_ms` (§4.4). Retry
/// de-duplication itself lives in `SyncController`'s own flag; this type only tracks the
/// schedule.
pub struct Backoff {
    options: BackoffOptions,
    current_delay_ms: u64,
    attempts_since_success: u32,
}

impl Backoff {
    pub fn new(options: BackoffOptions) -> Self {
        Self {
            options,
            current_delay_ms: 0,
            attempts_since_success: 0,
        }
    }

    /// Call after a failed attempt to learn how long to wait before the next one.
    pub fn record_failure(&mut self) -> NextAttempt {
        if let Some(max_retries) = self.options.max_retries {
            if self.attempts_since_success >= max_retries {
                return NextAttempt::Exhausted;
            }
        }
        self.attempts_since_success += 1;

        self.current_delay_ms = if self.current_delay_ms == 0 {
            INITIAL_DELAY_MS
        } else {
            (self.current_delay_ms * 2).min(self.options.max_delay_ms)
        };

        NextAttempt::RetryAfter(Duration::from_millis(self.current_delay_ms))
    }

    /// Resets the counter to zero, as happens on every successful initialization or sync
    /// (§4.4).
    pub fn record_success(&mut self) {
        self.current_delay_ms = 0;
        self.attempts_since_success = 0;
    }
}
