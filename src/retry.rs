//! Bounded timeout + retry policy for remote collaborators

use crate::error::AssistantError;
use crate::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound for a single attempt
    pub timeout: Duration,
    /// Extra attempts after the first one, only for retryable failures
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self { timeout, max_retries }
    }

    /// Run `op` under the policy. An attempt that exceeds `timeout` is turned
    /// into `on_timeout(..)`, which should build a retryable error.
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        on_timeout: fn(String) -> AssistantError,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;

        loop {
            let outcome = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(on_timeout(format!(
                    "{} timed out after {} ms",
                    label,
                    self.timeout.as_millis()
                ))),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(call = label, attempt, error = %e, "Retrying after failure");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_single_retry_then_surface() {
        let policy = RetryPolicy::new(Duration::from_secs(1), 1);
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run("flaky", AssistantError::RateUnavailable, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AssistantError::RateUnavailable("provider down".into()))
            })
            .await;

        assert!(matches!(result, Err(AssistantError::RateUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_is_not_retried() {
        let policy = RetryPolicy::new(Duration::from_secs(1), 3);
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run("pair", AssistantError::RateUnavailable, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AssistantError::InvalidCurrencyPair("XYZ".into()))
            })
            .await;

        assert!(matches!(result, Err(AssistantError::InvalidCurrencyPair(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_given_error() {
        let policy = RetryPolicy::new(Duration::from_millis(20), 0);

        let result: Result<u32> = policy
            .run("slow", AssistantError::OracleUnavailable, || async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(1)
            })
            .await;

        match result {
            Err(AssistantError::OracleUnavailable(msg)) => assert!(msg.contains("slow")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recovers_on_second_attempt() {
        let policy = RetryPolicy::new(Duration::from_secs(1), 1);
        let calls = AtomicU32::new(0);

        let result = policy
            .run("flaky", AssistantError::Storage, || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(AssistantError::Storage("busy".into()))
                } else {
                    Ok(7)
                }
            })
            .await;

        tokio_test::assert_ok!(&result);
        assert_eq!(result.unwrap(), 7);
    }
}
