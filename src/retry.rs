//! Bounded exponential backoff for transient store failures

use crate::config::RetryConfig;
use crate::error::Result;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            initial_delay_ms: config.initial_delay_ms,
            max_delay_ms: config.max_delay_ms,
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32))
            .min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(delay_ms)
    }
}

/// Run `f` until it succeeds, fails permanently, or runs out of attempts.
/// Only errors where [`crate::error::CoreError::is_transient`] holds are retried; the last
/// error is returned on exhaustion.
pub async fn execute_with_retry<F, Fut, T>(policy: &RetryPolicy, op: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.calculate_delay(attempt);
                tracing::debug!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    op,
                    attempt + 1,
                    policy.max_attempts,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!("{} gave up after {} attempts: {}", op, attempt + 1, e);
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 50,
            max_delay_ms: 300,
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(50));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = execute_with_retry(&fast_policy(4), "op", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CoreError::StoreUnavailable("busy".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_at_attempt_ceiling() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = execute_with_retry(&fast_policy(3), "op", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::StoreUnavailable("busy".into()))
        })
        .await;
        assert!(matches!(result, Err(CoreError::StoreUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = execute_with_retry(&fast_policy(5), "op", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::Validation("bad".into()))
        })
        .await;
        assert!(result.is_err());
        assert!(!result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
