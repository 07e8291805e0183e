//! Rate limiting for bulk writes
//!
//! Token bucket in documents per second. Callers over the limit are delayed,
//! never rejected: a request larger than the available tokens reserves them
//! on credit and sleeps until the debt would have been refilled. This keeps
//! requests bigger than the burst capacity from starving.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Configuration for write rate limiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum documents per second (0 = unlimited)
    pub per_second: u64,
    /// Tokens available at once after an idle period
    pub burst: u64,
}

impl RateLimitConfig {
    /// Create a config whose burst equals one second of traffic
    pub fn new(per_second: u64) -> Self {
        Self {
            per_second,
            burst: per_second,
        }
    }

    pub fn unlimited() -> Self {
        Self {
            per_second: 0,
            burst: 0,
        }
    }

    pub fn with_burst(per_second: u64, burst: u64) -> Self {
        Self { per_second, burst }
    }

    pub fn is_enabled(&self) -> bool {
        self.per_second > 0
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::unlimited()
    }
}

struct BucketState {
    /// Available tokens; negative while a reservation is outstanding
    tokens: f64,
    last_refill: Instant,
}

pub struct TokenBucket {
    config: RateLimitConfig,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = config.burst.max(1) as f64;
        Self {
            config,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit `count` documents, sleeping if the bucket is short.
    ///
    /// Returns the time spent waiting.
    pub async fn acquire(&self, count: u64) -> Duration {
        if !self.config.is_enabled() || count == 0 {
            return Duration::ZERO;
        }

        let wait = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let elapsed = now.duration_since(state.last_refill).as_secs_f64();
            state.tokens =
                (state.tokens + elapsed * self.config.per_second as f64).min(self.capacity);
            state.last_refill = now;

            state.tokens -= count as f64;
            if state.tokens >= 0.0 {
                Duration::ZERO
            } else {
                Duration::from_secs_f64(-state.tokens / self.config.per_second as f64)
            }
        };

        if !wait.is_zero() {
            debug!("Rate limiter: waiting {:?} to admit {} documents", wait, count);
            tokio::time::sleep(wait).await;
        }
        wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_never_waits() {
        let bucket = TokenBucket::new(RateLimitConfig::unlimited());
        assert_eq!(bucket.acquire(1_000_000).await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_free_then_delays() {
        let bucket = TokenBucket::new(RateLimitConfig::new(100));

        assert_eq!(bucket.acquire(100).await, Duration::ZERO);

        // Bucket is empty: 50 documents need half a second of refill
        let waited = bucket.acquire(50).await;
        assert_eq!(waited, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_larger_than_burst_is_delayed_not_rejected() {
        let bucket = TokenBucket::new(RateLimitConfig::with_burst(100, 10));
        let start = Instant::now();

        bucket.acquire(210).await;

        // 10 tokens on hand, 200 borrowed at 100/s
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_millis(2010));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refills_over_time() {
        let bucket = TokenBucket::new(RateLimitConfig::new(10));
        bucket.acquire(10).await;

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(bucket.acquire(10).await, Duration::ZERO);
    }
}
