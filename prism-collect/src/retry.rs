//! Bounded retry with exponential backoff and jitter

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::CollectError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based): exponential
    /// growth capped at `max_delay`, scaled by a random factor in
    /// [0.5, 1.5) so parallel sources do not retry in lockstep.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .min(self.max_delay);
        let jitter = 0.5 + rand::thread_rng().gen::<f64>();
        exp.mul_f64(jitter).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or the attempt
    /// budget is spent. Only transient errors are retried.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, CollectError>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T, CollectError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        source = err.source_id(),
                        attempt,
                        ?delay,
                        error = %err,
                        "transient collection failure, backing off"
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
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn transient() -> CollectError {
        CollectError::Network {
            source_id: "feed".into(),
            message: "connection reset".into(),
        }
    }

    #[tokio::test]
    async fn test_retry_stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy(3)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(transient())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy(5)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(CollectError::Payload {
                        source_id: "feed".into(),
                        message: "bad json".into(),
                    })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_grows_and_respects_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
        };
        for attempt in 1..=5 {
            assert!(policy.backoff_delay(attempt) <= policy.max_delay);
        }
        assert!(policy.backoff_delay(1) >= Duration::from_millis(50));
    }
}
