//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each attempt after that.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Run `operation` until it succeeds or the attempts are used up.
    ///
    /// `operation` receives the 1-based attempt number. On failure the last
    /// error is returned. Dropping the returned future cancels both the
    /// in-flight attempt and any pending backoff sleep.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= attempts => return Err(err),
                Err(err) => {
                    let delay = backoff_delay(attempt, self.base_delay());
                    debug!(attempt, max_attempts = attempts, ?delay, error = %err, "attempt failed, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt - 1)`.
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1 << exponent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(1, base), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, base), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, base), Duration::from_secs(4));
        assert_eq!(backoff_delay(0, base), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_does_not_overflow() {
        let delay = backoff_delay(u32::MAX, Duration::from_secs(u64::MAX / 2));
        assert_eq!(delay, Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result: Result<u32, String> = RetryPolicy::default()
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(format!("attempt {attempt} failed"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1000,
        };
        let result: Result<(), String> = policy
            .run(|attempt| async move { Err(format!("failure {attempt}")) })
            .await;
        assert_eq!(result, Err("failure 3".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_backoff() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let outcome = tokio::time::timeout(
            Duration::from_millis(1500),
            policy.run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("down") }
            }),
        )
        .await;

        assert!(outcome.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
