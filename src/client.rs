//! Public client API: fire-and-forget event capture.

use crate::config::Config;
use crate::dispatch::HttpBatchDispatcher;
use crate::model::{Action, Properties};
use crate::scheduler::FlushScheduler;
use crate::stats::{FailureCallback, OutcomeSink, Statistics, SuccessCallback};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Telemetry client owned by the application root.
///
/// All capture operations are non-blocking and never fail from the caller's
/// perspective; delivery failures surface only through the statistics
/// counters and the optional outcome callbacks. Construct one instance and
/// pass it by reference to all callers — there is no process-wide singleton.
///
/// `new` must be called within a tokio runtime: it spawns the background
/// flush coordinator.
pub struct Client {
    api_key: String,
    scheduler: FlushScheduler,
    outcomes: Arc<OutcomeSink>,
}

impl Client {
    /// Creates a client for the collector described by `config` and starts
    /// the flush coordinator.
    pub fn new(api_key: impl Into<String>, config: Config) -> Self {
        let api_key = api_key.into();
        let outcomes = Arc::new(OutcomeSink::new());
        let dispatcher = Arc::new(HttpBatchDispatcher::new(&config, outcomes.clone()));
        let scheduler = FlushScheduler::new(api_key.clone(), &config, dispatcher);
        scheduler.start();

        Self {
            api_key,
            scheduler,
            outcomes,
        }
    }

    /// Records a named application event for a distinct id.
    pub fn capture(
        &self,
        distinct_id: impl Into<String>,
        event: impl Into<String>,
        properties: Option<Properties>,
        timestamp: Option<DateTime<Utc>>,
    ) {
        self.enqueue(Action::capture(distinct_id, event, properties, timestamp));
    }

    /// Associates user properties with a distinct id.
    pub fn identify(
        &self,
        distinct_id: impl Into<String>,
        properties: Option<Properties>,
        timestamp: Option<DateTime<Utc>>,
    ) {
        self.enqueue(Action::identify(distinct_id, properties, timestamp));
    }

    /// Links a newly assigned distinct id to an existing one.
    pub fn alias(
        &self,
        new_id: impl Into<String>,
        original_id: impl Into<String>,
        timestamp: Option<DateTime<Utc>>,
    ) {
        self.enqueue(Action::alias(new_id, original_id, timestamp));
    }

    /// Records a page/screen view for a distinct id.
    pub fn page(
        &self,
        distinct_id: impl Into<String>,
        properties: Option<Properties>,
        timestamp: Option<DateTime<Utc>>,
    ) {
        self.enqueue(Action::page(distinct_id, properties, timestamp));
    }

    /// Drains the queue now and waits until every flush worker has finished.
    pub async fn flush(&self) {
        self.scheduler.flush().await;
    }

    /// Stops timers and batch assembly. In-flight batches finish; anything
    /// still queued is lost (the pipeline is not durable).
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Delivery counters.
    pub fn statistics(&self) -> &Statistics {
        self.outcomes.statistics()
    }

    /// Registers a callback invoked once per action on successful delivery.
    pub fn on_success(&self, callback: SuccessCallback) {
        self.outcomes.set_on_success(callback);
    }

    /// Registers a callback invoked once per action on terminal failure.
    pub fn on_failure(&self, callback: FailureCallback) {
        self.outcomes.set_on_failure(callback);
    }

    /// The API key batches are sent under.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Hands an action to the scheduler, then counts it as submitted.
    ///
    /// Submitted is incremented even when the scheduler drops the action for
    /// exceeding the per-action size ceiling — a documented accounting gap.
    fn enqueue(&self, action: Action) {
        self.scheduler.enqueue(action);
        self.outcomes.statistics().increment_submitted();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}
