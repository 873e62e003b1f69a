//! Retry with exponential backoff.
//!
//! Used for idempotent reads against the testbed (port status, attenuator
//! list, endpoint counters). Commands that change state are never retried
//! here: a duplicated `roam` or attenuation step would change the run.
//!
//! ```rust,ignore
//! use roamcheck_core::retry::{RetryPolicy, with_retry};
//!
//! let body = with_retry(&RetryPolicy::lanforge_read(), || client.get_json(url)).await?;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::TestbedError;

/// Configuration for retry behavior with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Initial delay before first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier applied to delay after each retry.
    pub backoff_factor: f64,
    /// Random jitter range as a fraction (0.1 = ±10%).
    pub jitter_percent: f64,
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter_percent: 0.1,
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Policy for LANforge JSON reads: 4 attempts, 250ms initial.
    #[must_use]
    pub fn lanforge_read() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            backoff_factor: 2.0,
            jitter_percent: 0.1,
            max_attempts: 4,
        }
    }

    /// No retries at all.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    #[must_use]
    #[allow(clippy::cast_possible_wrap)] // attempt is capped at 31
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let initial_ms = u64::try_from(self.initial_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);

        let exp = attempt.min(31) as i32;
        let base_ms = (initial_ms as f64) * self.backoff_factor.max(1.0).powi(exp);
        let base_ms = base_ms.min(max_ms as f64);

        let jitter = if self.jitter_percent > 0.0 {
            let jitter_range = base_ms * self.jitter_percent.clamp(0.0, 1.0);
            rand::rng().random_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        let delay_ms = (base_ms + jitter).max(0.0);
        Duration::from_millis(delay_ms as u64)
    }
}

/// Errors that know whether repeating the call might help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for TestbedError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

/// Execute an async operation with retry and exponential backoff.
///
/// Stops early on the first non-retryable error.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    E: Retryable + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(
                        total_attempts = attempt + 1,
                        "Operation succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                attempt += 1;
                if !e.is_retryable() {
                    return Err(e);
                }
                if attempt >= max_attempts {
                    warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "Operation failed after all retry attempts"
                    );
                    return Err(e);
                }

                let delay = policy.delay_for_attempt(attempt - 1);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying operation after failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
