//! Bounded retry for outbound calls
//!
//! Exponential backoff via the `backoff` crate. Only errors for which
//! [`AppError::is_transient`] holds are retried; everything else fails on
//! the first attempt.

use crate::config::RetryConfig;
use crate::errors::{AppError, Result};
use backoff::{future::retry, ExponentialBackoff};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            multiplier: config.multiplier,
            max_interval: Duration::from_millis(config.max_interval_ms),
        }
    }

    /// A policy that makes exactly one attempt
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::ZERO,
            multiplier: 1.0,
            max_interval: Duration::ZERO,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            current_interval: self.initial_interval,
            multiplier: self.multiplier,
            max_interval: self.max_interval,
            // Attempts are bounded by count, not elapsed time
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts;
        let mut attempt = 0u32;

        retry(self.backoff(), move || {
            attempt += 1;
            let current = attempt;
            let fut = op();
            async move {
                fut.await.map_err(|e: AppError| {
                    if e.is_transient() && current < max_attempts {
                        warn!(
                            operation,
                            attempt = current,
                            max_attempts,
                            error = %e,
                            "Transient failure, retrying"
                        );
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
