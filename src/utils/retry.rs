//! Retry utilities for transient outbound failures
//!
//! Exponential backoff with capped jitter. The retryability decision lives
//! on the error type itself via [`RetryableError`]; non-retryable failures
//! abort immediately without sleeping.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::{RepositoryError, TransportError};

/// Errors that can classify themselves as transient
pub trait RetryableError {
    fn is_retryable(&self) -> bool;
}

impl RetryableError for TransportError {
    fn is_retryable(&self) -> bool {
        TransportError::is_retryable(self)
    }
}

impl RetryableError for RepositoryError {
    fn is_retryable(&self) -> bool {
        RepositoryError::is_retryable(self)
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Initial delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add +/-20% jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl From<&crate::config::RetryPolicyConfig> for RetryConfig {
    fn from(config: &crate::config::RetryPolicyConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }
}

/// Execute an operation with retry logic
///
/// Returns the first successful result, the first non-retryable error, or
/// the last error once attempts are exhausted.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
    operation_name: &str,
) -> Result<T, E>
where
    E: RetryableError + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        "Operation '{}' succeeded on attempt {}/{}",
                        operation_name, attempt, config.max_attempts
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_retryable() {
                    debug!(
                        "Operation '{}' failed with non-retryable error: {}",
                        operation_name, err
                    );
                    return Err(err);
                }

                last_error = Some(err);

                if attempt < config.max_attempts {
                    let delay = calculate_delay(config, attempt);
                    warn!(
                        "Operation '{}' failed on attempt {}/{}, retrying in {:?}: {}",
                        operation_name,
                        attempt,
                        config.max_attempts,
                        delay,
                        last_error.as_ref().unwrap()
                    );
                    sleep(delay).await;
                } else {
                    warn!(
                        "Operation '{}' failed after {} attempts: {}",
                        operation_name,
                        config.max_attempts,
                        last_error.as_ref().unwrap()
                    );
                }
            }
        }
    }

    Err(last_error.unwrap())
}

/// Calculate delay with exponential backoff and optional +/-20% jitter
fn calculate_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponential_delay = config.initial_delay.as_millis() as f64
        * config.backoff_multiplier.powi((attempt - 1) as i32);

    let capped = exponential_delay.min(config.max_delay.as_millis() as f64);

    let final_delay = if config.jitter {
        // Spread delays across +/-20% to avoid synchronized retries
        let factor = 0.8 + rand::random::<f64>() * 0.4;
        capped * factor
    } else {
        capped
    };

    Duration::from_millis(final_delay as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    fn transient() -> TransportError {
        TransportError::Connection {
            endpoint: "storage".to_string(),
            message: "connection reset".to_string(),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(
            &fast_config(3),
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(transient())
                    } else {
                        Ok("recovered")
                    }
                }
            },
            "test_op",
        )
        .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_on_persistent_failure() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), TransportError> = with_retry(
            &fast_config(3),
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            },
            "test_op",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_abort_immediately() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), TransportError> = with_retry(
            &fast_config(5),
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(TransportError::Http {
                        endpoint: "storage".to_string(),
                        status: 404,
                    })
                }
            },
            "test_op",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(calculate_delay(&config, 1), Duration::from_millis(100));
        assert_eq!(calculate_delay(&config, 2), Duration::from_millis(200));
        assert_eq!(calculate_delay(&config, 3), Duration::from_millis(400));
        assert_eq!(calculate_delay(&config, 4), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        };
        for _ in 0..100 {
            let delay = calculate_delay(&config, 1).as_millis() as f64;
            assert!((80.0..=120.0).contains(&delay), "delay {delay} out of band");
        }
    }
}
