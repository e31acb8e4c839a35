//! Bounded retry on optimistic-concurrency conflicts

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// How often and how fast to retry a conflicting write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(10),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-conflict error, or the
/// policy runs out of attempts
///
/// `op` is re-invoked from scratch on every attempt, so it must re-read
/// whatever state it writes.
pub async fn retry_on_conflict<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_conflict() && attempt < attempts => {
                tracing::debug!(attempt, error = %e, "write conflict, retrying");
                attempt += 1;
                tokio::time::sleep(policy.delay).await;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KubeError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retries_conflicts_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_on_conflict(fast(5), move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(KubeError::Conflict("stale".into()))
            } else {
                Ok("saved")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "saved");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = retry_on_conflict(fast(5), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(KubeError::Conflict("stale".into()))
        })
        .await;

        assert!(result.unwrap_err().is_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = retry_on_conflict(fast(5), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(KubeError::Ledger("corrupt".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
