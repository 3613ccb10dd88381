//! Token-bucket rate limiter shared by every worker

use crate::AcquireError;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::trace;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Bounds the aggregate outbound call rate
///
/// Tokens refill continuously at `rate` per second up to `capacity`. The
/// bucket starts full, so up to `capacity` calls go out immediately.
/// Accounting happens under a short lock; waiting happens outside it.
///
/// # Examples
///
/// ```
/// use quarry_acquire::RateLimiter;
///
/// # tokio_test::block_on(async {
/// let limiter = RateLimiter::new(10.0, 2).unwrap();
/// limiter.acquire(1).await.unwrap();
/// # });
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a limiter; `rate` must be positive and `capacity` at least 1
    pub fn new(rate: f64, capacity: u32) -> Result<Self, AcquireError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(AcquireError::Config(format!("rate must be > 0, got {}", rate)));
        }
        if capacity == 0 {
            return Err(AcquireError::Config("capacity must be at least 1".to_string()));
        }
        Ok(Self {
            rate,
            capacity: f64::from(capacity),
            bucket: Mutex::new(Bucket {
                tokens: f64::from(capacity),
                last: Instant::now(),
            }),
        })
    }

    /// Tokens per second
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Burst size
    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }

    /// Wait until `n` tokens are available and take them
    ///
    /// There is no deadline; wrap the call in a timeout to bound the wait.
    pub async fn acquire(&self, n: u32) -> Result<(), AcquireError> {
        let wanted = f64::from(n);
        if wanted > self.capacity {
            return Err(AcquireError::Config(format!(
                "requested {} tokens, capacity is {}",
                n, self.capacity
            )));
        }

        loop {
            let wait = {
                let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
                bucket.last = now;

                if bucket.tokens >= wanted {
                    bucket.tokens -= wanted;
                    return Ok(());
                }
                Duration::from_secs_f64((wanted - bucket.tokens) / self.rate)
            };

            trace!(wait_ms = wait.as_millis() as u64, "rate limiter waiting");
            sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_invalid_rate_rejected() {
        assert!(RateLimiter::new(0.0, 1).is_err());
        assert!(RateLimiter::new(-1.0, 1).is_err());
        assert!(RateLimiter::new(f64::NAN, 1).is_err());
        assert!(RateLimiter::new(1.0, 0).is_err());
    }

    #[tokio::test]
    async fn test_request_above_capacity_rejected() {
        let limiter = RateLimiter::new(1.0, 2).unwrap();
        assert!(matches!(limiter.acquire(3).await, Err(AcquireError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_immediate() {
        let limiter = RateLimiter::new(1.0, 3).unwrap();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire(1).await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ten_concurrent_acquires_take_four_seconds() {
        let limiter = Arc::new(RateLimiter::new(2.0, 2).unwrap());
        let start = Instant::now();

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire(1).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(4), "finished in {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "finished in {:?}", elapsed);
    }
}
