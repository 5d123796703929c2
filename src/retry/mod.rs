//! Classified retry loop with exponential backoff.
//!
//! Every attempt runs under the per-attempt timeout from the transaction
//! context. Failures are classified; only transient kinds are retried, and
//! whatever ends the loop comes back wrapped in `PersistError::Retry`.

pub mod backoff;
pub mod classify;

use crate::audit::TransactionLogger;
use crate::config::RetryPolicy;
use crate::core::{PersistError, Result, TransactionContext};
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

pub use backoff::{backoff_delay, exponential_delay_ms, jittered_delay_ms};
pub use classify::{Classification, classify_error, classify_message};

#[derive(Clone)]
pub struct RetryManager {
    policy: RetryPolicy,
    logger: TransactionLogger,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryManager {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            logger: TransactionLogger::new(),
        }
    }

    pub fn with_logger(&self, logger: TransactionLogger) -> Self {
        Self {
            policy: self.policy.clone(),
            logger,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation` up to `context.max_retries + 1` times.
    ///
    /// `context.retry_count()` holds the number of failed attempts so far
    /// and is updated before each attempt starts.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        context: &TransactionContext,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let logger = self.logger.for_transaction(context);
        let total_attempts = context.max_retries.saturating_add(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            context.set_retry_count(attempt - 1);

            let outcome = match timeout(context.timeout, operation()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(PersistError::Timeout(context.timeout.as_millis() as u64)),
            };

            let err = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        logger.info(
                            "Operation succeeded after retry",
                            json!({ "attempts": attempt }),
                        );
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let classification = classify_error(&err);
            if !classification.retryable {
                logger.warn(
                    format!("Non-retryable {} error, aborting", classification.kind),
                    json!({ "attempt": attempt, "error": err.to_string() }),
                );
                return Err(PersistError::Retry {
                    attempts: attempt,
                    last_error: Box::new(err),
                });
            }
            if attempt >= total_attempts {
                logger.error(
                    "Retry attempts exhausted",
                    json!({
                        "attempts": attempt,
                        "errorKind": classification.kind,
                        "error": err.to_string(),
                    }),
                );
                return Err(PersistError::Retry {
                    attempts: attempt,
                    last_error: Box::new(err),
                });
            }

            let delay = backoff_delay(&self.policy, attempt);
            logger.log_retry_attempt(attempt + 1, &err, classification.kind, delay);
            sleep(delay).await;
        }
    }

    /// Retry loop for callers without a transaction context.
    ///
    /// Uses the same classification and backoff shape, with `base_delay`
    /// replacing the policy's base delay. No per-attempt timeout is applied.
    pub async fn simple_retry<T, F, Fut>(
        &self,
        max_retries: u32,
        base_delay: Duration,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = RetryPolicy {
            base_delay_ms: base_delay.as_millis().max(1) as u64,
            ..self.policy.clone()
        };
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let classification = classify_error(&err);
            if !classification.retryable || attempt > max_retries {
                return Err(PersistError::Retry {
                    attempts: attempt,
                    last_error: Box::new(err),
                });
            }

            let delay = backoff_delay(&policy, attempt);
            self.logger
                .log_retry_attempt(attempt + 1, &err, classification.kind, delay);
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ErrorKind, Operation};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay_ms: 1,
            max_delay_ms: 5,
            min_delay_ms: 1,
            jitter: 0.25,
        }
    }

    fn context(max_retries: u32, timeout_ms: u64) -> TransactionContext {
        TransactionContext::new(
            "page-1",
            None,
            Operation::Update,
            max_retries,
            Duration::from_millis(timeout_ms),
        )
    }

    #[tokio::test]
    async fn test_transient_error_retried_until_exhausted() {
        let manager = RetryManager::new(fast_policy());
        let ctx = context(3, 1_000);
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<()> = manager
            .execute_with_retry(&ctx, || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(PersistError::Store("connection reset by peer".into()))
                }
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, PersistError::Retry { attempts: 4, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(ctx.retry_count(), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let manager = RetryManager::new(fast_policy());
        let ctx = context(3, 1_000);
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<()> = manager
            .execute_with_retry(&ctx, || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(PersistError::Store(
                        "duplicate key value violates unique constraint".into(),
                    ))
                }
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, PersistError::Retry { attempts: 1, .. }));
        assert_eq!(classify_error(&err).kind, ErrorKind::ConstraintViolation);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.retry_count(), 0);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let manager = RetryManager::new(fast_policy());
        let ctx = context(3, 1_000);
        let calls = Arc::new(AtomicU32::new(0));

        let value = manager
            .execute_with_retry(&ctx, || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(PersistError::Store("deadlock detected".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(ctx.retry_count(), 2);
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_classified_as_timeout() {
        let manager = RetryManager::new(fast_policy());
        let ctx = context(1, 20);

        let result: Result<()> = manager
            .execute_with_retry(&ctx, || async {
                sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err.root(), PersistError::Timeout(20)));
        assert!(matches!(err, PersistError::Retry { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let manager = RetryManager::new(fast_policy());
        let ctx = context(0, 1_000);

        let result: Result<()> = manager
            .execute_with_retry(&ctx, || async {
                Err(PersistError::Connection("ECONNREFUSED".into()))
            })
            .await;

        assert!(matches!(result.unwrap_err(), PersistError::Retry { attempts: 1, .. }));
        assert_eq!(ctx.retry_count(), 0);
    }

    #[tokio::test]
    async fn test_simple_retry() {
        let manager = RetryManager::default();
        let calls = Arc::new(AtomicU32::new(0));

        let value = manager
            .simple_retry(2, Duration::from_millis(1), || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(PersistError::Store("socket hang up".into()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, "done");

        let fatal: Result<()> = manager
            .simple_retry(2, Duration::from_millis(1), || async {
                Err(PersistError::Store("permission denied for table pages".into()))
            })
            .await;
        assert!(matches!(fatal.unwrap_err(), PersistError::Retry { attempts: 1, .. }));
    }
}
