//! Delivery statistics and per-action outcome callbacks.

use crate::error::DeliveryError;
use crate::model::Action;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Callback invoked once per action when its batch is delivered.
pub type SuccessCallback = Arc<dyn Fn(&Action) + Send + Sync>;

/// Callback invoked once per action when its batch terminally fails.
pub type FailureCallback = Arc<dyn Fn(&Action, &DeliveryError) + Send + Sync>;

/// Monotonically increasing delivery counters.
///
/// `submitted` counts every client API call, including actions later dropped
/// for exceeding the per-action size ceiling — those never reach
/// `succeeded` or `failed`, which is a known accounting gap kept on purpose.
#[derive(Debug, Default)]
pub struct Statistics {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl Statistics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn increment_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Actions handed to the client API.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Actions whose batch was delivered with HTTP 200.
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// Actions whose batch terminally failed.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Fans a batch outcome out to counters and user callbacks.
///
/// Every dispatched action resolves through here exactly once: either
/// [`resolve_success`](Self::resolve_success) or
/// [`resolve_failure`](Self::resolve_failure), as a side effect of the batch
/// it belonged to. A panicking callback is caught and logged so sibling
/// actions in the same batch still get their bookkeeping.
pub struct OutcomeSink {
    stats: Statistics,
    on_success: RwLock<Option<SuccessCallback>>,
    on_failure: RwLock<Option<FailureCallback>>,
}

impl OutcomeSink {
    /// Creates a sink with zeroed counters and no callbacks.
    pub fn new() -> Self {
        Self {
            stats: Statistics::new(),
            on_success: RwLock::new(None),
            on_failure: RwLock::new(None),
        }
    }

    /// The counters.
    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Registers the per-action success callback, replacing any previous one.
    pub fn set_on_success(&self, callback: SuccessCallback) {
        *self.on_success.write().expect("lock poisoned") = Some(callback);
    }

    /// Registers the per-action failure callback, replacing any previous one.
    pub fn set_on_failure(&self, callback: FailureCallback) {
        *self.on_failure.write().expect("lock poisoned") = Some(callback);
    }

    /// Marks every action in a delivered batch as succeeded.
    pub fn resolve_success(&self, actions: &[Action]) {
        let callback = self.on_success.read().expect("lock poisoned").clone();
        for action in actions {
            self.stats.increment_succeeded();
            if let Some(callback) = &callback {
                if catch_unwind(AssertUnwindSafe(|| callback(action))).is_err() {
                    warn!(event = %action.event(), "success callback panicked");
                }
            }
        }
    }

    /// Marks every action in a failed batch as failed, carrying the terminal error.
    pub fn resolve_failure(&self, actions: &[Action], error: &DeliveryError) {
        let callback = self.on_failure.read().expect("lock poisoned").clone();
        for action in actions {
            self.stats.increment_failed();
            if let Some(callback) = &callback {
                if catch_unwind(AssertUnwindSafe(|| callback(action, error))).is_err() {
                    warn!(event = %action.event(), error = %error, "failure callback panicked");
                }
            }
        }
    }
}

impl Default for OutcomeSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn actions(n: usize) -> Vec<Action> {
        (0..n)
            .map(|i| Action::capture("user", format!("event-{}", i), None, None))
            .collect()
    }

    #[test]
    fn counters_start_at_zero() {
        let stats = Statistics::new();
        assert_eq!(stats.submitted(), 0);
        assert_eq!(stats.succeeded(), 0);
        assert_eq!(stats.failed(), 0);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let stats = Arc::new(Statistics::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let stats = stats.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    stats.increment_submitted();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.submitted(), 8000);
    }

    #[test]
    fn resolve_success_counts_and_calls_per_action() {
        let sink = OutcomeSink::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_cb = calls.clone();
        sink.set_on_success(Arc::new(move |_action| {
            calls_in_cb.fetch_add(1, Ordering::SeqCst);
        }));

        sink.resolve_success(&actions(3));
        assert_eq!(sink.statistics().succeeded(), 3);
        assert_eq!(sink.statistics().failed(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn resolve_failure_counts_and_carries_error() {
        let sink = OutcomeSink::new();
        let seen = Arc::new(RwLock::new(Vec::new()));
        let seen_in_cb = seen.clone();
        sink.set_on_failure(Arc::new(move |action, error| {
            seen_in_cb
                .write()
                .unwrap()
                .push((action.event().to_string(), error.to_string()));
        }));

        let error = DeliveryError::Client {
            status: 400,
            body: "bad".into(),
        };
        sink.resolve_failure(&actions(2), &error);

        assert_eq!(sink.statistics().failed(), 2);
        assert_eq!(sink.statistics().succeeded(), 0);
        let seen = seen.read().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].1.contains("HTTP 400"));
    }

    #[test]
    fn resolving_without_callbacks_still_counts() {
        let sink = OutcomeSink::new();
        sink.resolve_success(&actions(2));
        sink.resolve_failure(&actions(1), &DeliveryError::RateLimited);
        assert_eq!(sink.statistics().succeeded(), 2);
        assert_eq!(sink.statistics().failed(), 1);
    }

    #[test]
    fn panicking_callback_does_not_skip_siblings() {
        let sink = OutcomeSink::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_cb = calls.clone();
        sink.set_on_success(Arc::new(move |_action| {
            calls_in_cb.fetch_add(1, Ordering::SeqCst);
            panic!("user callback bug");
        }));

        sink.resolve_success(&actions(3));

        // All three actions were counted and all three callbacks attempted
        assert_eq!(sink.statistics().succeeded(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn replacing_a_callback_takes_effect() {
        let sink = OutcomeSink::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let first_in_cb = first.clone();
        sink.set_on_success(Arc::new(move |_| {
            first_in_cb.fetch_add(1, Ordering::SeqCst);
        }));
        let second_in_cb = second.clone();
        sink.set_on_success(Arc::new(move |_| {
            second_in_cb.fetch_add(1, Ordering::SeqCst);
        }));

        sink.resolve_success(&actions(1));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
