//! Async utilities and patterns
//!
//! Provides retry with exponential backoff and timeout helpers

use crate::error::{DelveError, DelveResult, ErrorContext};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, warn};

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: usize,
    /// Minimum delay between attempts in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay between attempts in milliseconds
    pub max_delay_ms: u64,
    /// Backoff multiplier (exponential backoff)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 4000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given failed attempt (1-based), before jitter.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let raw = (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64).max(self.initial_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter {
            return delay;
        }
        let jitter_factor = 0.1;
        let jitter = (fastrand::f64() - 0.5) * 2.0 * jitter_factor;
        let millis = (delay.as_millis() as f64) * (1.0 + jitter);
        Duration::from_millis((millis as u64).min(self.max_delay_ms))
    }
}

/// Retry an async operation with exponential backoff.
///
/// `is_retryable` decides whether a failure is worth another attempt; a
/// non-retryable failure is returned immediately.
pub async fn retry_async<F, Fut, T, E, P>(
    mut operation: F,
    config: &RetryConfig,
    operation_name: &str,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        debug!(
            operation = operation_name,
            attempt = attempt,
            max_attempts = max_attempts,
            "Attempting operation"
        );

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if attempt >= max_attempts || !is_retryable(&err) {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        error = %err,
                        "Operation failed, giving up"
                    );
                    return Err(err);
                }

                let delay = config.jittered(config.delay_for_attempt(attempt));
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );

                sleep(delay).await;
            }
        }
    }
}

/// Timeout wrapper for async operations
pub async fn with_timeout<F, T>(future: F, timeout_ms: u64, operation_name: &str) -> DelveResult<T>
where
    F: Future<Output = T>,
{
    match timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(DelveError::Timeout {
            operation: operation_name.to_string(),
            duration_ms: timeout_ms,
            context: ErrorContext::new("async_utils")
                .with_operation("timeout")
                .with_metadata("timeout_ms", &timeout_ms.to_string())
                .with_suggestion("Increase timeout duration")
                .with_suggestion("Verify the model server is reachable"),
        }),
    }
}
