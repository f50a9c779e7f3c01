//! Retry-delay state machine for batch dispatch.
//!
//! Pure function of the attempt count: binary exponential growth from a fixed
//! base, a bounded random jitter on top, and a hard cap. One `Backoff` is
//! attached to a single batch's dispatch attempt sequence and discarded after.

use rand::Rng;
use std::time::{Duration, Instant};

/// Base delay for the first retry.
const BASE_DELAY: Duration = Duration::from_millis(100);

/// Exponential backoff with jitter and an attempt/elapsed-time budget.
///
/// [`next_delay`](Self::next_delay) hands out growing delays until the budget
/// is exhausted: either the un-jittered delay has already been granted at the
/// cap once, or the optional elapsed-time budget has run out. After that it
/// returns `None` and the caller treats the batch as failed.
#[derive(Debug)]
pub struct Backoff {
    max: Duration,
    jitter: Duration,
    max_elapsed: Option<Duration>,
    attempt: u32,
    exhausted: bool,
    started_at: Instant,
}

impl Backoff {
    /// Default cap on a single delay.
    pub const DEFAULT_MAX: Duration = Duration::from_secs(10);

    /// Default upper bound of the random jitter component.
    pub const DEFAULT_JITTER: Duration = Duration::from_secs(5);

    /// Creates a backoff with the given delay cap and jitter bound.
    pub fn new(max: Duration, jitter: Duration) -> Self {
        Self {
            max,
            jitter,
            max_elapsed: None,
            attempt: 0,
            exhausted: false,
            started_at: Instant::now(),
        }
    }

    /// Additionally bounds the total elapsed time across all delays.
    pub fn with_max_elapsed(mut self, budget: Duration) -> Self {
        self.max_elapsed = Some(budget);
        self
    }

    /// Number of delays granted so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Whether the budget is spent.
    pub fn has_reached_max(&self) -> bool {
        self.exhausted
    }

    /// Restores the initial state for a new attempt sequence.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.exhausted = false;
        self.started_at = Instant::now();
    }

    /// Returns the next delay to wait before retrying, or `None` once the
    /// budget is exhausted.
    ///
    /// The un-jittered delay doubles per attempt and is capped at `max`; the
    /// capped delay is granted exactly once before exhaustion. The returned
    /// value adds a uniform random component in `[0, jitter]`.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.exhausted {
            return None;
        }
        if let Some(budget) = self.max_elapsed {
            if self.started_at.elapsed() >= budget {
                self.exhausted = true;
                return None;
            }
        }

        let raw = self.raw_delay(self.attempt);
        self.attempt += 1;
        if raw >= self.max {
            self.exhausted = true;
        }

        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };

        Some(raw + jitter)
    }

    /// Un-jittered delay for an attempt index: `base * 2^attempt`, capped.
    fn raw_delay(&self, attempt: u32) -> Duration {
        let base_ms = BASE_DELAY.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(multiplier).min(max_ms))
    }
}
