//! # Backoff Executor
//!
//! Retries a fallible async operation with exponential backoff and jitter.
//!
//! The delay before retry `n` (0-based) is
//! `min(base_delay * 2^n + jitter, max_delay)` where jitter is drawn uniformly
//! from `0..=max_jitter`. Errors that are not retryable are returned
//! immediately without waiting.

use crate::UpstreamError;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Classification of errors for the backoff executor.
pub trait Retryable {
    /// `true` if repeating the operation may succeed
    fn is_retryable(&self) -> bool;
}

impl Retryable for UpstreamError {
    fn is_retryable(&self) -> bool {
        UpstreamError::is_retryable(self)
    }
}

/// Retry policy configuration for exponential backoff
///
/// # Examples
///
/// ```rust
/// use orientation_relay_core::retry::RetryPolicy;
/// use std::time::Duration;
///
/// // Default policy: 3 retries, 1s base, 10s cap, up to 1s jitter
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.total_attempts(), 4);
///
/// // Custom policy
/// let policy = RetryPolicy::new(2, Duration::from_millis(200), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,

    /// Delay before the first retry, doubled for each subsequent one
    pub base_delay: Duration,

    /// Upper bound for any single delay, jitter included
    pub max_delay: Duration,

    /// Upper bound for the random jitter added to each delay
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with the default jitter range
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            ..Self::default()
        }
    }

    /// Disable jitter (deterministic delays, used in tests)
    pub fn without_jitter(mut self) -> Self {
        self.max_jitter = Duration::ZERO;
        self
    }

    /// Set a custom upper bound for the jitter
    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Total number of attempts (initial + retries)
    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Calculate the delay before retry `attempt` (0-based)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use orientation_relay_core::retry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default().without_jitter();
    /// assert_eq!(policy.calculate_delay(0), Duration::from_secs(1));
    /// assert_eq!(policy.calculate_delay(2), Duration::from_secs(4));
    /// assert_eq!(policy.calculate_delay(10), Duration::from_secs(10));
    /// ```
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let exponential = self.base_delay.saturating_mul(factor);

        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            let max_ms = self.max_jitter.as_millis() as u64;
            Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
        };

        exponential.saturating_add(jitter).min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently, or retries run out.
    ///
    /// Uses the error's own [`Retryable`] classification.
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        self.run_with(operation, |error: &E| error.is_retryable()).await
    }

    /// Run `operation` with a caller-supplied retry classifier.
    ///
    /// Returns the last error seen once the attempts are exhausted.
    pub async fn run_with<T, E, F, Fut, C>(
        &self,
        mut operation: F,
        is_retryable: C,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        C: Fn(&E) -> bool,
    {
        let mut attempt: u32 = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempts = attempt + 1, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if attempt >= self.max_retries {
                        warn!(
                            attempts = attempt + 1,
                            error = %error,
                            "Retries exhausted; giving up"
                        );
                        return Err(error);
                    }

                    if !is_retryable(&error) {
                        debug!(error = %error, "Non-retryable failure");
                        return Err(error);
                    }

                    let delay = self.calculate_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure; retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
