//! Per-source rate limiting
//!
//! Two mechanisms compose: a bounded semaphore caps in-flight requests
//! per source, and a minimum-interval throttle spaces out request
//! starts. The registry hands every source its own limiter so a slow
//! or chatty source never starves the others.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_concurrent: usize,
    pub min_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            min_interval: Duration::from_millis(500),
        }
    }
}

/// Held for the duration of one request.
pub struct RatePermit {
    _permit: OwnedSemaphorePermit,
}

pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            min_interval: config.min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait for a concurrency permit and this source's next start slot.
    pub async fn acquire(&self) -> RatePermit {
        // The semaphore is never closed, so acquire cannot fail.
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("limiter semaphore closed"));

        let slot = {
            let mut next = self.next_slot.lock();
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.min_interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
        RatePermit { _permit: permit }
    }
}

/// Shared registry of per-source limiters.
#[derive(Default)]
pub struct LimiterRegistry {
    limiters: DashMap<String, Arc<RateLimiter>>,
}

impl LimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_source(&self, source_id: &str, config: &RateLimitConfig) -> Arc<RateLimiter> {
        self.limiters
            .entry(source_id.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::new(config.clone())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_min_interval_spaces_out_starts() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_concurrent: 4,
            min_interval: Duration::from_millis(50),
        });
        let start = Instant::now();
        let _first = limiter.acquire().await;
        let _second = limiter.acquire().await;
        let _third = limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_semaphore_bounds_concurrency() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            max_concurrent: 1,
            min_interval: Duration::ZERO,
        }));
        let held = limiter.acquire().await;
        let contender = Arc::clone(&limiter);
        let blocked = tokio::spawn(async move { contender.acquire().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());
        drop(held);
        blocked.await.expect("acquire task");
    }

    #[tokio::test]
    async fn test_registry_reuses_limiters_per_source() {
        let registry = LimiterRegistry::new();
        let config = RateLimitConfig::default();
        let a = registry.for_source("feed", &config);
        let b = registry.for_source("feed", &config);
        let other = registry.for_source("reddit", &config);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
    }
}
