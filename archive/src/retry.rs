use std::future::Future;
use std::time::Duration;

use node_config::{DEFAULT_RETRY_BASE_DELAY_MS, MAX_RETRY_DELAY_MS};
use tracing::warn;

use crate::error::ArchiveError;

/// Bounded exponential backoff around registry and storage calls.
///
/// `max_retries == 0` keeps the fail-fast behaviour: the first transport
/// failure is returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fail_fast()
    }
}

impl RetryPolicy {
    pub fn fail_fast() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
        }
    }

    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::fail_fast()
        }
    }

    /// Delay before retry number `attempt` (zero based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .saturating_mul(factor)
            .min(Duration::from_millis(MAX_RETRY_DELAY_MS))
    }

    pub async fn run<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, ArchiveError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ArchiveError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        what,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn status(status: u16) -> ArchiveError {
        ArchiveError::UnexpectedStatus {
            url: "http://registry".to_string(),
            status,
        }
    }

    #[rstest]
    #[case(0, 1_000)]
    #[case(1, 2_000)]
    #[case(5, 32_000)]
    #[case(6, MAX_RETRY_DELAY_MS)]
    #[case(31, MAX_RETRY_DELAY_MS)]
    #[case(40, MAX_RETRY_DELAY_MS)]
    fn delay_doubles_up_to_cap(#[case] attempt: u32, #[case] expected_ms: u64) {
        let policy = RetryPolicy::with_retries(3);
        assert_eq!(policy.delay_for(attempt), Duration::from_millis(expected_ms));
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        };
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let value = policy
            .run("pool", move || async move {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err(status(503)),
                    _ => Ok(7),
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        };
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), _> = policy
            .run("pool", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(status(429))
            })
            .await;

        assert!(matches!(result, Err(ArchiveError::UnexpectedStatus { status: 429, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(1),
        };
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), _> = policy
            .run("bundle", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(status(404))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
