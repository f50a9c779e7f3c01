//! HTTP batch dispatcher with retry and exponential backoff.

use crate::backoff::Backoff;
use crate::config::Config;
use crate::error::DeliveryError;
use crate::model::Batch;
use crate::stats::OutcomeSink;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// User-agent sent with every batch request.
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Delivery seam between the flush scheduler and the transport.
///
/// The scheduler hands each assembled batch to a dispatcher and moves on;
/// outcome resolution (counters, callbacks) happens inside the dispatcher.
#[async_trait]
pub trait BatchDispatcher: Send + Sync {
    /// Delivers one batch, resolving every member action to exactly one
    /// terminal outcome before returning.
    async fn dispatch(&self, batch: Batch);
}

/// Dispatcher that POSTs batches to the collector's `/batch` endpoint.
///
/// One request is in flight at a time per call; retryable failures
/// (transport errors, 5xx, 429) are retried with a fresh [`Backoff`] per
/// batch, and any other non-200 response fails the batch immediately.
pub struct HttpBatchDispatcher {
    client: reqwest::Client,
    endpoint: String,
    max_retry_time: Option<std::time::Duration>,
    outcomes: Arc<OutcomeSink>,
}

impl HttpBatchDispatcher {
    /// Creates a dispatcher for the configured collector.
    pub fn new(config: &Config, outcomes: Arc<OutcomeSink>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            endpoint: config.batch_endpoint(),
            max_retry_time: config.max_retry_time,
            outcomes,
        }
    }

    /// Fresh backoff state for one batch's attempt sequence.
    fn backoff(&self) -> Backoff {
        let backoff = Backoff::new(Backoff::DEFAULT_MAX, Backoff::DEFAULT_JITTER);
        match self.max_retry_time {
            Some(budget) => backoff.with_max_elapsed(budget),
            None => backoff,
        }
    }

    /// One HTTP attempt with the pre-serialized payload.
    async fn attempt(&self, payload: &[u8]) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                if status == StatusCode::OK {
                    Ok(())
                } else if status == StatusCode::TOO_MANY_REQUESTS {
                    Err(DeliveryError::RateLimited)
                } else if status.is_server_error() {
                    Err(DeliveryError::Server {
                        status: status.as_u16(),
                    })
                } else {
                    let body = response.text().await.unwrap_or_default();
                    Err(DeliveryError::Client {
                        status: status.as_u16(),
                        body,
                    })
                }
            }
            Err(e) => Err(DeliveryError::Transport(e.to_string())),
        }
    }
}

#[async_trait]
impl BatchDispatcher for HttpBatchDispatcher {
    async fn dispatch(&self, batch: Batch) {
        if batch.is_empty() {
            return;
        }

        // Serialize once; retries reuse the same payload
        let payload = match serde_json::to_vec(&batch) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, count = batch.len(), "Batch serialization failed");
                self.outcomes
                    .resolve_failure(batch.actions(), &DeliveryError::Serialization(e.to_string()));
                return;
            }
        };

        debug!(
            endpoint = %self.endpoint,
            count = batch.len(),
            bytes = payload.len(),
            "Sending batch"
        );

        let mut backoff = self.backoff();
        let mut requests = 0u32;

        loop {
            requests += 1;

            match self.attempt(&payload).await {
                Ok(()) => {
                    info!(count = batch.len(), attempts = requests, "Batch delivered");
                    self.outcomes.resolve_success(batch.actions());
                    return;
                }
                Err(err) if err.is_retryable() => match backoff.next_delay() {
                    Some(delay) => {
                        warn!(
                            attempt = requests,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Batch send failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        error!(attempts = requests, error = %err, "Retry budget exhausted");
                        self.outcomes.resolve_failure(
                            batch.actions(),
                            &DeliveryError::RetryBudgetExhausted {
                                attempts: requests,
                                last: Box::new(err),
                            },
                        );
                        return;
                    }
                },
                Err(err) => {
                    error!(error = %err, "Batch rejected, not retrying");
                    self.outcomes.resolve_failure(batch.actions(), &err);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Action;
    use std::time::Duration;

    fn unreachable_config() -> Config {
        Config {
            // Reserved port with nothing listening
            host: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_millis(200),
            max_retry_time: Some(Duration::ZERO),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_batch_produces_no_outcome() {
        let outcomes = Arc::new(OutcomeSink::new());
        let dispatcher = HttpBatchDispatcher::new(&unreachable_config(), outcomes.clone());

        dispatcher.dispatch(Batch::new("key", Vec::new())).await;

        assert_eq!(outcomes.statistics().succeeded(), 0);
        assert_eq!(outcomes.statistics().failed(), 0);
    }

    #[tokio::test]
    async fn transport_failure_exhausts_budget_and_fails_all_actions() {
        let outcomes = Arc::new(OutcomeSink::new());
        let errors = Arc::new(std::sync::Mutex::new(Vec::new()));
        let errors_in_cb = errors.clone();
        outcomes.set_on_failure(Arc::new(move |_action, error| {
            errors_in_cb.lock().unwrap().push(error.clone());
        }));

        let dispatcher = HttpBatchDispatcher::new(&unreachable_config(), outcomes.clone());
        let actions = vec![
            Action::capture("u", "a", None, None),
            Action::capture("u", "b", None, None),
        ];
        dispatcher.dispatch(Batch::new("key", actions)).await;

        assert_eq!(outcomes.statistics().failed(), 2);
        assert_eq!(outcomes.statistics().succeeded(), 0);

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            &errors[0],
            DeliveryError::RetryBudgetExhausted { attempts: 1, last }
                if matches!(**last, DeliveryError::Transport(_))
        ));
    }

    #[test]
    fn backoff_honors_retry_time_budget() {
        let outcomes = Arc::new(OutcomeSink::new());
        let dispatcher = HttpBatchDispatcher::new(&unreachable_config(), outcomes);
        let mut backoff = dispatcher.backoff();
        // Zero budget: exhausted before the first delay
        assert_eq!(backoff.next_delay(), None);
    }
}
