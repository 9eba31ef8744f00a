//! Bounded retry with exponential backoff for remote calls.
//!
//! Every call made by the reader, writer, clearing step and existence
//! checker goes through [`RetryPolicy::execute`]. Each governed call keeps
//! its own attempt counter; nothing is shared between calls.

use crate::config::CloneConfig;
use crate::error::{CloneError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error};

/// Longest wait between two attempts, whatever the backoff computes.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(600);

/// Retry settings for governed remote calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Growth of the delay per further attempt.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CloneConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff_factor,
        }
    }

    pub fn from_config(config: &CloneConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.retry_delay(),
            config.backoff_factor,
        )
    }

    /// Delay after failed attempt `attempt` (1-indexed).
    ///
    /// `base_delay * backoff_factor^(attempt - 1)`, capped at [`MAX_RETRY_DELAY`].
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return self.base_delay.min(MAX_RETRY_DELAY);
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }

    /// Run `operation` until it succeeds or attempts run out.
    ///
    /// Every failed attempt is logged at ERROR level. The last error is
    /// returned wrapped in [`CloneError::Retry`] tagged with `label`.
    /// Cancellation is returned as-is without further attempts.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => e,
            };

            error!(error = %err, "Attempt {}/{} failed for {}", attempt, self.max_attempts, label);

            if attempt >= self.max_attempts {
                return Err(CloneError::Retry {
                    label: label.to_string(),
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = self.delay_for_attempt(attempt);
            debug!("Retrying {} in {:?}", label, delay);
            tokio::time::sleep(delay).await;
        }
    }
}
