//! Generic retry executor with exponential backoff.
//!
//! The executor is policy-driven and classification-driven: the caller
//! decides which failures are fatal and which are worth another attempt,
//! and how exhaustion is reported. The backoff sleep sits behind the
//! [`Sleeper`] seam so tests can observe waits without real delays.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Attempt and backoff limits for one retry loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. At least 1.
    pub max_attempts: u32,
    /// Backoff base in seconds: the wait after failed attempt `n` is
    /// `backoff_base^n`.
    pub backoff_base: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 2,
        }
    }
}

impl RetryPolicy {
    /// Wait duration after the given 1-based failed attempt.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.backoff_base.saturating_pow(attempt))
    }
}

/// What the classifier decided about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Propagate immediately, no further attempts.
    Fatal,
    /// Sleep and try again while attempts remain.
    Retry,
}

/// Blocking-wait seam.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `operation` up to `policy.max_attempts` times.
///
/// Failures classified `Fatal` are re-raised untouched. Failures classified
/// `Retry` wait `backoff_base^attempt` seconds and try again; once attempts
/// are exhausted the last failure is handed to `exhausted` for wrapping.
pub async fn run<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    classify: impl Fn(&Error) -> Disposition,
    exhausted: impl FnOnce(u32, Error) -> Error,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        debug!("operation attempt {attempt}/{}", policy.max_attempts);
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => match classify(&err) {
                Disposition::Fatal => return Err(err),
                Disposition::Retry => {
                    warn!("attempt {attempt} failed: {err}");
                    last_error = Some(err);
                    if attempt < policy.max_attempts {
                        let wait = policy.backoff_after(attempt);
                        info!("retrying in {} seconds", wait.as_secs());
                        sleeper.sleep(wait).await;
                    }
                }
            },
        }
    }

    let last = last_error.unwrap_or_else(|| {
        Error::transient(
            "retry loop finished without recording an error",
            crate::error::code::RETRY_EXHAUSTED,
        )
    });
    Err(exhausted(policy.max_attempts, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::RecordingSleeper;
    use crate::error::code;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn retry_all(_: &Error) -> Disposition {
        Disposition::Retry
    }

    fn wrap(attempts: u32, last: Error) -> Error {
        Error::transient(
            format!("operation failed after {attempts} attempts: {last}"),
            code::RETRY_EXHAUSTED,
        )
    }

    #[tokio::test]
    async fn test_first_attempt_success_skips_backoff() {
        let policy = RetryPolicy::default();
        let sleeper = RecordingSleeper::new();
        let result = run(&policy, &sleeper, retry_all, wrap, || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff_base: 2,
        };
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);

        let result = run(&policy, &sleeper, retry_all, wrap, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::transient("connection reset", code::DRIVER_ERROR))
                } else {
                    Ok("data")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "data");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            sleeper.waits(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test]
    async fn test_fatal_failure_stops_immediately() {
        let policy = RetryPolicy::default();
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);

        let classify = |err: &Error| match err {
            Error::Authentication { .. } => Disposition::Fatal,
            _ => Disposition::Retry,
        };

        let result: Result<()> = run(&policy, &sleeper, classify, wrap, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::authentication("bad credentials")) }
        })
        .await;

        assert_eq!(result.unwrap_err().code(), code::AUTH_ERROR);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn test_exhaustion_wraps_last_error() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_base: 2,
        };
        let sleeper = RecordingSleeper::new();

        let result: Result<()> = run(&policy, &sleeper, retry_all, wrap, || async {
            Err(Error::transient("timed out", code::NAV_TIMEOUT))
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.code(), code::RETRY_EXHAUSTED);
        assert!(err.message().contains("after 3 attempts"));
        assert!(err.message().contains("timed out"));
        // No sleep after the final attempt.
        assert_eq!(sleeper.waits().len(), 2);
    }
}
