//! Retry with exponential backoff, layered under a circuit breaker.
//!
//! `ResilientClient` applies, from the outside in: circuit breaker, retry,
//! raw call. Both layers are generic over the call's result and only look at
//! success, failure and [`ServiceError::is_retryable`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::breaker::{BreakerRegistry, CircuitBreaker};
use crate::error::ServiceError;

/// Backoff schedule for transient errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before the `retry`-th retry (1-based): doubles each time, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(
            self.initial_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }

    /// Run `op`, retrying retryable errors until the budget is spent.
    pub async fn run<T, F, Fut>(&self, dependency: &str, mut op: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut retries = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if retries >= self.max_retries => {
                    tracing::warn!(dependency, retries, "retries exhausted: {e}");
                    return Err(e);
                }
                Err(e) => {
                    retries += 1;
                    // Honour the service's retry-after hint, within the cap.
                    let delay = e
                        .retry_after_ms()
                        .map(|ms| Duration::from_millis(ms.min(self.max_delay_ms)))
                        .unwrap_or_else(|| self.delay_for(retries));
                    tracing::debug!(
                        dependency,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        "transient error, backing off: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Circuit breaker + retry around calls to one external dependency.
#[derive(Debug, Clone)]
pub struct ResilientClient {
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl ResilientClient {
    /// Client for `dependency`, sharing that dependency's breaker from `registry`.
    pub fn new(registry: &BreakerRegistry, dependency: &str, retry: RetryPolicy) -> Self {
        Self {
            breaker: registry.breaker(dependency),
            retry,
        }
    }

    pub fn dependency(&self) -> &str {
        self.breaker.name()
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Call `op` through the breaker, retrying transient failures. A whole
    /// exhausted retry sequence counts as one breaker failure.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let dependency = self.breaker.name();
        self.breaker
            .call(|| self.retry.run(dependency, op))
            .await
    }
}
