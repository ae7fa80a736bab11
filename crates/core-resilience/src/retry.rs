//! Bounded retry with backoff for upstream calls
//!
//! Every call against an external catalog goes through [`retry`]. Transient
//! failures are retried up to [`RetryPolicy::max_attempts`] total attempts
//! with a delay computed by [`RetryPolicy::calculate_delay`]; permanent
//! failures are returned immediately. When the attempts run out the last
//! error is wrapped in [`ResilienceError::MaxRetriesExceeded`].
//!
//! ```
//! use ballast_core_resilience::{retry, RetryPolicy, ResilienceError};
//!
//! # tokio_test_block(async {
//! let policy = RetryPolicy::immediate(3);
//! let value = retry(&policy, "lookup", || async { Ok::<_, ResilienceError>(7) })
//!     .await
//!     .unwrap();
//! assert_eq!(value, 7);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use crate::error::ResilienceError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Backoff strategy for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,

    /// Linear increase in delay
    Linear,

    /// Exponential increase in delay (2^n)
    Exponential,

    /// Exponential with random jitter to prevent thundering herd
    ExponentialWithJitter,
}

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,

    /// Backoff strategy to use
    pub backoff: BackoffStrategy,

    /// Jitter factor (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff: BackoffStrategy::ExponentialWithJitter,
            jitter_factor: 0.3,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries without sleeping (tests, dry runs)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff: BackoffStrategy::Fixed,
            jitter_factor: 0.0,
        }
    }

    /// Calculate delay for a given attempt number (1-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base_delay = match self.backoff {
            BackoffStrategy::Linear => self.initial_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential | BackoffStrategy::ExponentialWithJitter => {
                let multiplier = 2_u32.saturating_pow(attempt - 1);
                self.initial_delay.saturating_mul(multiplier)
            }
            BackoffStrategy::Fixed => self.initial_delay,
        };

        let capped_delay = base_delay.min(self.max_delay);

        if matches!(self.backoff, BackoffStrategy::ExponentialWithJitter) && self.jitter_factor > 0.0
        {
            let jitter = rand::rng().random_range(0.0..self.jitter_factor);
            let jitter_amount = capped_delay.as_secs_f64() * jitter;
            capped_delay + Duration::from_secs_f64(jitter_amount)
        } else {
            capped_delay
        }
    }
}

/// Execute `operation` under `policy`, retrying transient failures.
///
/// `label` names the call in log output.
pub async fn retry<F, Fut, T>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, ResilienceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ResilienceError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(operation = label, attempt, "succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                warn!(
                    operation = label,
                    attempts = attempt,
                    error = %e,
                    "giving up after exhausting retries"
                );
                return Err(ResilienceError::MaxRetriesExceeded {
                    attempts: attempt,
                    last_error: e.to_string(),
                });
            }
            Err(e) => {
                let delay = policy.calculate_delay(attempt);
                warn!(
                    operation = label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}
