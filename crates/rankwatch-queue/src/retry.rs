//! Retry executor

use std::fmt::Display;
use std::future::Future;
use tracing::{debug, warn};

use crate::backoff::BackoffPolicy;

/// Every attempt failed; carries the last underlying error
#[derive(Debug, thiserror::Error)]
#[error("operation failed after {attempts} attempts: {last_error}")]
pub struct RetryError<E> {
    pub attempts: u32,
    #[source]
    pub last_error: E,
}

/// Runs an operation up to `max_retries + 1` times, sleeping the calling task
/// for the backoff delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryExecutor {
    max_retries: u32,
    backoff: BackoffPolicy,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(5, BackoffPolicy::default())
    }
}

impl RetryExecutor {
    pub fn new(max_retries: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Same backoff, different retry bound
    pub fn with_max_retries(&self, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: self.backoff,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Execute `operation`, passing it the 0-based attempt number.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            let delay = self.backoff.delay(attempt);
            if !delay.is_zero() {
                debug!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Waiting before retry"
                );
                tokio::time::sleep(delay).await;
            }

            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(RetryError {
                            attempts: attempt,
                            last_error: e,
                        });
                    }
                    warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Attempt failed, will retry"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_success_on_first_attempt_does_not_retry() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let retry = RetryExecutor::new(5, BackoffPolicy::none());

        let value = retry
            .execute(move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(42)
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_means_one_attempt() {
        let retry = RetryExecutor::new(0, BackoffPolicy::none());
        let err = retry
            .execute(|_| async { Err::<(), _>("nope") })
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_between_attempts() {
        let retry = RetryExecutor::new(2, BackoffPolicy::exponential(Duration::from_secs(10)));
        let start = tokio::time::Instant::now();

        let err = retry
            .execute(|_| async { Err::<(), _>("down") })
            .await
            .unwrap_err();

        // 10s before attempt 1, 20s before attempt 2
        assert_eq!(err.attempts, 3);
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert!(start.elapsed() < Duration::from_secs(31));
    }
}
