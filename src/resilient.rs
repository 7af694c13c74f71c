//! Retry wrapper for external round trips.
//!
//! Every collaborator call can fail three ways and each gets a different
//! treatment: transient failures (network, timeout, rate limit) back off
//! and retry; malformed responses retry immediately with a fresh call;
//! anything else is fatal and propagates untouched. One attempt budget is
//! shared across both retryable kinds for a single call.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Failure taxonomy at the external-service boundary.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Network trouble, timeout, or rate limiting. Retried with backoff.
    #[error("transient service failure: {0}")]
    Transient(String),
    /// The collaborator answered, but not with the expected structure.
    /// Retried immediately; a fresh call usually parses.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// Not retryable: bad credentials, rejected request, local I/O.
    #[error("{0}")]
    Fatal(String),
}

impl ServiceError {
    pub fn from_http(err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ServiceError::Transient(err.to_string())
        } else {
            ServiceError::Fatal(err.to_string())
        }
    }
}

/// Attempt budget and backoff base for one wrapped call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Run `op` until it succeeds, the budget is exhausted, or it fails
    /// fatally. The last error is surfaced on exhaustion.
    pub async fn call<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    match &err {
                        ServiceError::Malformed(msg) => {
                            warn!(
                                call = label,
                                attempt,
                                "malformed response, retrying immediately: {}",
                                msg
                            );
                        }
                        ServiceError::Transient(msg) => {
                            let delay = self
                                .backoff_base
                                .saturating_mul(2u32.saturating_pow(attempt - 1));
                            warn!(
                                call = label,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "transient failure, backing off: {}",
                                msg
                            );
                            tokio::time::sleep(delay).await;
                        }
                        ServiceError::Fatal(_) => return Err(err),
                    }
                }
            }
        }
    }
}
