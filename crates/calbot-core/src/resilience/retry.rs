//! Fixed-delay retry for idempotent operations.

use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::observer::{ResilienceObserver, RetryAttempt, TracingObserver};
use crate::config::duration;
use crate::error::{RetryError, Transient};

/// How often and how patiently to repeat a failing operation.
///
/// Callers must only wrap operations that are safe to run more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Pause between attempts
    #[serde(with = "duration")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run `operation`, logging each failed attempt through `tracing`.
    pub async fn run<F, Fut, T, E>(&self, name: &str, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + std::fmt::Display,
    {
        self.run_observed(name, operation, &TracingObserver).await
    }

    /// Run `operation` up to `max_attempts` times.
    ///
    /// Transient failures are retried after `delay`; the delay never follows
    /// the last attempt. A non-transient error ends the loop immediately.
    pub async fn run_observed<F, Fut, T, E>(
        &self,
        name: &str,
        mut operation: F,
        observer: &dyn ResilienceObserver,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let attempts = AtomicU32::new(0);

        let backoff = ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(max_attempts as usize - 1);

        let result = (|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            operation()
        })
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .when(|e: &E| e.is_transient())
        .notify(|e: &E, delay: Duration| {
            observer.on_retry(&RetryAttempt {
                operation: name.to_string(),
                attempt: attempts.load(Ordering::SeqCst),
                max_attempts,
                next_delay: Some(delay),
                error: e.to_string(),
            });
        })
        .await;

        match result {
            Ok(value) => Ok(value),
            Err(e) if e.is_transient() => {
                let attempts = attempts.load(Ordering::SeqCst);
                observer.on_retry(&RetryAttempt {
                    operation: name.to_string(),
                    attempt: attempts,
                    max_attempts,
                    next_delay: None,
                    error: e.to_string(),
                });
                Err(RetryError::Exhausted {
                    operation: name.to_string(),
                    attempts,
                    last_error: e,
                })
            }
            Err(e) => {
                tracing::debug!(operation = name, error = %e, "Non-transient failure, not retrying");
                Err(RetryError::Permanent(e))
            }
        }
    }
}
