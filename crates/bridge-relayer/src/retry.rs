//! # Query Retry
//!
//! Retry loop for read-only contract and RPC calls.
//!
//! - Transient errors (`Network`, `Timeout`) are retried up to
//!   `max_attempts` total attempts, sleeping per the [`Backoff`] between
//!   attempts. The last error is returned after exhaustion.
//! - `RateLimited { retry_after_secs }` sleeps exactly that long and does
//!   not consume an attempt.
//! - Any other error is returned at once.
//!
//! State-changing calls never go through this loop. Every call, retried
//! or not, is bounded by [`with_timeout`].

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::config::ContractCallConfig;
use crate::domain::RelayerError;

/// Delay policy between attempts.
pub trait Backoff: Send + Sync {
    /// Delay after the `attempt`-th failure (1-based).
    fn delay_ms(&self, attempt: u32) -> u64;
}

/// `base_delay_ms * attempt^2`: 1x, 4x, 9x, ...
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuadraticBackoff {
    base_delay_ms: u64,
}

impl QuadraticBackoff {
    /// Create a policy with the given base delay.
    pub fn new(base_delay_ms: u64) -> Self {
        Self { base_delay_ms }
    }
}

impl Default for QuadraticBackoff {
    fn default() -> Self {
        Self { base_delay_ms: 500 }
    }
}

impl Backoff for QuadraticBackoff {
    fn delay_ms(&self, attempt: u32) -> u64 {
        let n = u64::from(attempt);
        self.base_delay_ms.saturating_mul(n.saturating_mul(n))
    }
}

/// Bound a call by `limit`, mapping expiry to [`RelayerError::Timeout`].
pub async fn with_timeout<T, Fut>(limit: Duration, call: Fut) -> Result<T, RelayerError>
where
    Fut: Future<Output = Result<T, RelayerError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RelayerError::Timeout(limit.as_millis() as u64)),
    }
}

/// Timeout and retry settings for read-only calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadPolicy {
    /// Deadline per attempt.
    pub timeout: Duration,
    /// Total attempts on transient failure.
    pub max_attempts: u32,
    /// Delay curve between attempts.
    pub backoff: QuadraticBackoff,
}

impl ReadPolicy {
    /// Build from the contract call settings.
    pub fn from_config(config: &ContractCallConfig) -> Self {
        Self {
            timeout: config.call_timeout(),
            max_attempts: config.query_max_attempts,
            backoff: QuadraticBackoff::new(config.query_backoff_base_ms),
        }
    }

    /// Run a read with a per-attempt deadline and transient-error retry.
    pub async fn read<T, F, Fut>(&self, name: &str, mut operation: F) -> Result<T, RelayerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RelayerError>>,
    {
        retry_with_backoff(name, self.max_attempts, &self.backoff, || {
            with_timeout(self.timeout, operation())
        })
        .await
    }

    /// Run a state-changing call once, bounded by the deadline.
    pub async fn submit<T, Fut>(&self, call: Fut) -> Result<T, RelayerError>
    where
        Fut: Future<Output = Result<T, RelayerError>>,
    {
        with_timeout(self.timeout, call).await
    }
}

/// Run `operation` until it succeeds, fails permanently or runs out of attempts.
pub async fn retry_with_backoff<T, F, Fut>(
    name: &str,
    max_attempts: u32,
    backoff: &impl Backoff,
    mut operation: F,
) -> Result<T, RelayerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RelayerError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(RelayerError::RateLimited { retry_after_secs }) => {
                warn!(
                    operation = name,
                    retry_after_secs, "Rate limited, waiting before retry"
                );
                relayer_telemetry::metrics::record_query_retry();
                tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
            }
            Err(err) if err.is_transient() => {
                attempt += 1;
                if attempt >= max_attempts {
                    error!(
                        operation = name,
                        attempts = attempt,
                        error = %err,
                        "Retries exhausted"
                    );
                    return Err(err);
                }

                let delay = backoff.delay_ms(attempt);
                warn!(
                    operation = name,
                    attempt,
                    delay_ms = delay,
                    error = %err,
                    "Query failed, retrying"
                );
                relayer_telemetry::metrics::record_query_retry();
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(err) => return Err(err),
        }
    }
}
