//! Bounded retries for mutating cloud calls.
//!
//! Only `conflict` and `locked` errors are retried: they mean another
//! operation is mutating the same network right now. Everything else fails
//! on the first attempt.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{CloudError, Error, Operation, Result};

/// Delay before retrying, as a function of the failed attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately.
    None,
    Fixed(Duration),
    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the `attempt`-th failure (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of calls, including the first one. At least 1.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    /// 5 attempts, exponential backoff from 1s capped at 30s.
    fn default() -> Self {
        Self::new(
            5,
            Backoff::Exponential {
                base: Duration::from_secs(1),
                max: Duration::from_secs(30),
            },
        )
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. The last error is returned, tagged with `op`.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    op: Operation,
    cancel: &CancellationToken,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, CloudError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled { op }),
            result = call() => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.kind.is_retryable() || attempt >= policy.max_attempts {
            return Err(Error::Api { op, source: err });
        }

        let delay = policy.backoff.delay(attempt);
        debug!(%op, attempt, ?delay, error = %err, "server network: retrying");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled { op }),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{ApiErrorKind, ErrorKind};

    fn immediate(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Backoff::None)
    }

    #[tokio::test]
    async fn retries_conflicts_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry(
            &immediate(5),
            Operation::Attach,
            &CancellationToken::new(),
            || async {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err(CloudError::from_code("conflict", "network busy")),
                    _ => Ok(42),
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(
            &immediate(5),
            Operation::Detach,
            &CancellationToken::new(),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CloudError::from_code("not_found", "server not found"))
            },
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.is_api(ApiErrorKind::NotFound));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausting_attempts_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(
            &immediate(3),
            Operation::ChangeAliasIps,
            &CancellationToken::new(),
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let code = if n % 2 == 0 { "locked" } else { "conflict" };
                Err(CloudError::from_code(code, format!("attempt {n}")))
            },
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_api(ApiErrorKind::Locked));
        assert!(err.to_string().contains("attempt 2"));
    }

    #[tokio::test]
    async fn single_attempt_policy() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(
            &immediate(0),
            Operation::Attach,
            &CancellationToken::new(),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CloudError::from_code("conflict", "network busy"))
            },
        )
        .await;

        assert!(result.unwrap_err().is_api(ApiErrorKind::Conflict));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_before_first_call() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<()> = retry(&immediate(5), Operation::Attach, &cancel, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert!(matches!(
            result,
            Err(Error::Cancelled {
                op: Operation::Attach
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_during_backoff() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::new(5, Backoff::Fixed(Duration::from_secs(60)));

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result: Result<()> = tokio::time::timeout(
            Duration::from_secs(5),
            retry(&policy, Operation::Detach, &cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CloudError::from_code("locked", "server is locked"))
            }),
        )
        .await
        .expect("backoff sleep should stop on cancellation");

        assert!(matches!(
            result,
            Err(Error::Cancelled {
                op: Operation::Detach
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(5),
        };
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(backoff.delay(3), Duration::from_secs(4));
        assert_eq!(backoff.delay(4), Duration::from_secs(5));
        assert_eq!(backoff.delay(40), Duration::from_secs(5));
        assert_eq!(Backoff::None.delay(3), Duration::ZERO);
    }
}
