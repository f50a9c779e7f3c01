//! Delivery error types.

use thiserror::Error;

/// Terminal and retryable failure kinds for batch delivery.
///
/// `Transport`, `Server`, and `RateLimited` are retryable: the dispatcher
/// consumes them internally and retries with backoff. `Client`,
/// `RetryBudgetExhausted`, and `Serialization` are terminal and only ever
/// surface through the failure callback and the `failed` counter — never as
/// a returned error to the caller that enqueued the action.
#[derive(Error, Debug, Clone)]
pub enum DeliveryError {
    /// Connection, TLS, or timeout failure before a response was received.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Collector returned a 5xx response.
    #[error("server error: HTTP {status}")]
    Server {
        /// HTTP status code.
        status: u16,
    },

    /// Collector returned 429 Too Many Requests.
    #[error("rate limited (HTTP 429)")]
    RateLimited,

    /// Collector returned a non-retryable non-200 status (typically 4xx).
    #[error("client error: HTTP {status}: {body}")]
    Client {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// Retry attempts or the elapsed-time budget ran out.
    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    RetryBudgetExhausted {
        /// Number of requests made before giving up.
        attempts: u32,
        /// The last retryable error observed.
        last: Box<DeliveryError>,
    },

    /// The batch could not be serialized to JSON.
    #[error("batch serialization failed: {0}")]
    Serialization(String),
}

impl DeliveryError {
    /// Whether the dispatcher should retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeliveryError::Transport(_) | DeliveryError::Server { .. } | DeliveryError::RateLimited
        )
    }
}
