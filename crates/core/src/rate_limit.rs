use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::clock::Clock;

/// Admission control for model-backed operations.
///
/// The engine holds no counters of its own; a deployment that runs several
/// processes plugs in a shared implementation here.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Takes one token for `key`, returning false when the bucket is empty.
    async fn try_acquire(&self, key: &str) -> bool;

    /// Drops whatever is held for `key`. Called once the key's session ends.
    fn release(&self, _key: &str) {}
}

/// Admits everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn try_acquire(&self, _key: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    refilled_at: DateTime<Utc>,
}

/// Per-key token bucket held in process memory.
pub struct TokenBucketLimiter {
    capacity: f64,
    refill_per_second: f64,
    clock: Arc<dyn Clock>,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl TokenBucketLimiter {
    /// `burst` tokens at most, refilled at `per_minute` tokens a minute.
    pub fn new(burst: u32, per_minute: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity: f64::from(burst.max(1)),
            refill_per_second: f64::from(per_minute) / 60.0,
            clock,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Number of keys with a live bucket.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn try_acquire(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            refilled_at: now,
        });

        let elapsed = (now - bucket.refilled_at).num_milliseconds().max(0) as f64 / 1000.0;
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_second).min(self.capacity);
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            tracing::debug!("Rate limit reached for key {}", key);
            false
        }
    }

    fn release(&self, key: &str) {
        self.buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    #[tokio::test]
    async fn test_bucket_drains_and_refills() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = TokenBucketLimiter::new(2, 60, clock.clone());

        assert!(limiter.try_acquire("s1").await);
        assert!(limiter.try_acquire("s1").await);
        assert!(!limiter.try_acquire("s1").await);

        // Another key has its own bucket.
        assert!(limiter.try_acquire("s2").await);

        clock.advance(Duration::seconds(1));
        assert!(limiter.try_acquire("s1").await);
        assert!(!limiter.try_acquire("s1").await);
    }

    #[tokio::test]
    async fn test_release_drops_bucket() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = TokenBucketLimiter::new(1, 1, clock);
        assert!(limiter.try_acquire("s1").await);
        assert!(limiter.try_acquire("s2").await);
        assert_eq!(limiter.tracked_keys(), 2);

        limiter.release("s1");
        assert_eq!(limiter.tracked_keys(), 1);
        limiter.release("unknown");
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn test_refill_is_capped_at_burst() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = TokenBucketLimiter::new(1, 60, clock.clone());
        assert!(limiter.try_acquire("s").await);
        clock.advance(Duration::minutes(10));
        assert!(limiter.try_acquire("s").await);
        assert!(!limiter.try_acquire("s").await);
    }
}
