//! How an operation reacts to its own failure.
//!
//! The steady-state loop never gives up on a handle. Within a cycle only
//! SQLite lock contention is worth retrying; everything else waits for the
//! next cycle.

use crate::ErrorExt;
use std::future::Future;
use std::time::Duration;
use tracing::info;

/// What to do when an operation fails.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryStrategy {
    /// Try again after a doubling, jittered delay
    RetryWithBackoff {
        max_attempts: usize,
        initial_delay: Duration,
        max_delay: Duration,
    },
    /// Leave it for the next cycle
    Skip,
    /// Run once and surface the error
    Fail,
}

impl RecoveryStrategy {
    /// Short backoff used for SQLite lock contention between workers.
    pub fn store_contention() -> Self {
        RecoveryStrategy::RetryWithBackoff {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
pub enum RecoveryResult<T, E> {
    Recovered(T),
    Skipped,
    Failed(E),
}

impl<T, E> RecoveryResult<T, E> {
    pub fn is_recovered(&self) -> bool {
        matches!(self, RecoveryResult::Recovered(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RecoveryResult::Skipped)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RecoveryResult::Failed(_))
    }

    /// Converts back into a plain result. `on_skip` supplies the error used
    /// when the strategy skipped the operation.
    pub fn into_result(self, on_skip: impl FnOnce() -> E) -> Result<T, E> {
        match self {
            RecoveryResult::Recovered(value) => Ok(value),
            RecoveryResult::Skipped => Err(on_skip()),
            RecoveryResult::Failed(error) => Err(error),
        }
    }
}

pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Runs `operation` under `strategy`. `Skip` never calls it.
    pub async fn apply_strategy<F, T, E, Fut>(
        strategy: RecoveryStrategy,
        operation: F,
    ) -> RecoveryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorExt + std::fmt::Display,
    {
        match strategy {
            RecoveryStrategy::RetryWithBackoff {
                max_attempts,
                initial_delay,
                max_delay,
            } => Self::retry_with_backoff(operation, max_attempts, initial_delay, max_delay).await,
            RecoveryStrategy::Skip => RecoveryResult::Skipped,
            RecoveryStrategy::Fail => {
                let mut operation = operation;
                match operation().await {
                    Ok(value) => RecoveryResult::Recovered(value),
                    Err(error) => RecoveryResult::Failed(error),
                }
            }
        }
    }

    async fn retry_with_backoff<F, T, E, Fut>(
        mut operation: F,
        max_attempts: usize,
        initial_delay: Duration,
        max_delay: Duration,
    ) -> RecoveryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorExt + std::fmt::Display,
    {
        let mut attempt = 0;
        let mut delay = initial_delay;

        loop {
            match operation().await {
                Ok(result) => return RecoveryResult::Recovered(result),
                Err(error) => {
                    attempt += 1;

                    if attempt >= max_attempts || !error.is_retryable() {
                        return RecoveryResult::Failed(error);
                    }

                    if let Some(retry_delay) = error.retry_after() {
                        delay = delay.max(retry_delay);
                    }
                    delay = delay.min(max_delay);

                    // Up to 10% jitter so contending workers don't retry in lockstep
                    let jitter_ms = fastrand::u64(0..=(delay.as_millis() as u64 / 10));
                    let sleep_for = delay + Duration::from_millis(jitter_ms);

                    info!(
                        attempt,
                        max_attempts,
                        delay = ?sleep_for,
                        "Retrying after: {}",
                        error
                    );

                    tokio::time::sleep(sleep_for).await;

                    delay = std::cmp::min(delay * 2, max_delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retry_with_backoff_recovers() {
        let attempts = AtomicUsize::new(0);
        let strategy = RecoveryStrategy::RetryWithBackoff {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };

        let result: RecoveryResult<u32, StoreError> =
            ErrorRecovery::apply_strategy(strategy, || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(StoreError::DatabaseLocked)
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert!(result.is_recovered());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable() {
        let attempts = AtomicUsize::new(0);
        let result: RecoveryResult<(), StoreError> =
            ErrorRecovery::apply_strategy(RecoveryStrategy::store_contention(), || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(StoreError::AlreadyExists {
                        handle: "alice".to_string(),
                        permalink: "https://x.com/alice/status/1".to_string(),
                    })
                }
            })
            .await;

        assert!(result.is_failed());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skip_strategy() {
        let result: RecoveryResult<&str, StoreError> =
            ErrorRecovery::apply_strategy(RecoveryStrategy::Skip, || async {
                Err(StoreError::DatabaseLocked)
            })
            .await;

        assert!(result.is_skipped());
    }
}
