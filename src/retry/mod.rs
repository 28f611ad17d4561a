//! Retry and backoff support for service and checkpoint calls

mod backoff;

pub use backoff::{Backoff, ExponentialBackoff, ExponentialBackoffBuilder, FixedBackoff};

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounds for retrying a failed operation.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt (`None` for unlimited).
    pub max_retries: Option<u32>,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Jitter factor (0.0 to 1.0).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: Some(3),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Whether another retry is allowed after `retries_made` failed retries.
    pub fn allows_retry(&self, retries_made: u32) -> bool {
        self.max_retries.map_or(true, |max| retries_made < max)
    }

    /// Backoff strategy matching this configuration.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::builder()
            .initial_delay(self.initial_backoff)
            .max_delay(self.max_backoff)
            .jitter_factor(self.jitter_factor)
            .build()
    }
}

/// Drives an operation to completion under a [`RetryConfig`], sleeping
/// between attempts. The operation's own error type is returned once the
/// retry budget is spent, so callers keep their error taxonomy.
pub struct RetryHandle<B: Backoff> {
    config: RetryConfig,
    backoff: B,
    attempts: u32,
}

impl<B: Backoff> RetryHandle<B> {
    pub fn new(config: RetryConfig, backoff: B) -> Self {
        Self {
            config,
            backoff,
            attempts: 0,
        }
    }

    /// Attempts performed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub async fn run<F, Fut, T, E>(&mut self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        loop {
            self.attempts += 1;
            match operation().await {
                Ok(value) => {
                    debug!(attempts = self.attempts, "operation succeeded");
                    return Ok(value);
                }
                Err(e) => {
                    let retries_made = self.attempts - 1;
                    if !self.config.allows_retry(retries_made) {
                        warn!(
                            attempts = self.attempts,
                            error = %e,
                            "retry budget exhausted"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff.delay(retries_made);
                    warn!(
                        attempt = self.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "operation failed, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config(max_retries: Option<u32>) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            jitter_factor: 0.0,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let config = fast_config(Some(3));
        let mut retry = RetryHandle::new(config.clone(), config.backoff());

        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry
            .run(|| {
                let counter = counter_clone.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("not yet")
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("success"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(retry.attempts(), 3);
    }

    #[tokio::test]
    async fn returns_the_final_error_when_budget_spent() {
        let config = fast_config(Some(2));
        let mut retry = RetryHandle::new(config.clone(), config.backoff());

        let result: Result<(), &str> = retry.run(|| async { Err("always fails") }).await;

        assert_eq!(result, Err("always fails"));
        assert_eq!(retry.attempts(), 3); // initial attempt + 2 retries
    }

    #[test]
    fn allows_retry_respects_the_limit() {
        let config = fast_config(Some(2));
        assert!(config.allows_retry(0));
        assert!(config.allows_retry(1));
        assert!(!config.allows_retry(2));

        let unlimited = fast_config(None);
        assert!(unlimited.allows_retry(10_000));
    }
}
