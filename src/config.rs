//! Pipeline configuration.

use std::time::Duration;

/// Configuration for queueing, batching, flushing, and delivery.
#[derive(Debug, Clone)]
pub struct Config {
    /// Collector hostname. The batch endpoint is `https://{host}/batch`;
    /// a value containing `://` is used verbatim as the base URL instead,
    /// so self-hosted collectors (and tests) can use explicit schemes.
    pub host: String,
    /// Per-request deadline for a single HTTP attempt.
    pub timeout: Duration,
    /// Queue length that triggers an immediate asynchronous flush.
    pub max_queue_size: usize,
    /// Maximum number of actions per assembled batch.
    pub flush_at: usize,
    /// Period of the timer-driven flush trigger.
    pub flush_interval: Duration,
    /// Maximum number of simultaneously running flush workers.
    pub threads: usize,
    /// Optional cap on the total time spent retrying one batch. When unset,
    /// retries stop once the backoff delay has grown to its cap.
    pub max_retry_time: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "app.posthog.com".to_string(),
            timeout: Duration::from_secs(5),
            max_queue_size: 10_000,
            flush_at: 20,
            flush_interval: Duration::from_secs(10),
            threads: 1,
            max_retry_time: None,
        }
    }
}

impl Config {
    /// Full URL of the collector's batch endpoint.
    pub fn batch_endpoint(&self) -> String {
        if self.host.contains("://") {
            format!("{}/batch", self.host.trim_end_matches('/'))
        } else {
            format!("https://{}/batch", self.host)
        }
    }
}
