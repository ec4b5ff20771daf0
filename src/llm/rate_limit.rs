// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-provider token-bucket rate limiting.
//!
//! Each provider gets an independent limiter parameterised by requests per
//! minute and burst size. Every outbound API call waits on the limiter
//! before issuing; an RPM of zero or below means unlimited and never blocks.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Token-bucket rate limiter.
pub struct RateLimiter {
    bucket: Option<Mutex<Bucket>>,
    tokens_per_second: f64,
}

struct Bucket {
    tokens: f64,
    capacity: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter. `requests_per_minute <= 0` means unlimited.
    pub fn new(requests_per_minute: i32, burst: u32) -> Self {
        if requests_per_minute <= 0 {
            return Self::unlimited();
        }

        let capacity = burst.max(1) as f64;
        Self {
            bucket: Some(Mutex::new(Bucket {
                tokens: capacity,
                capacity,
                last_refill: Instant::now(),
            })),
            tokens_per_second: requests_per_minute as f64 / 60.0,
        }
    }

    /// A limiter that never blocks.
    pub fn unlimited() -> Self {
        Self {
            bucket: None,
            tokens_per_second: 0.0,
        }
    }

    /// Whether this limiter can ever block.
    pub fn is_limited(&self) -> bool {
        self.bucket.is_some()
    }

    /// Wait until a request token is available, then consume it.
    pub async fn acquire(&self) {
        let Some(bucket) = &self.bucket else {
            return;
        };

        loop {
            let wait = {
                let mut b = bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(b.last_refill).as_secs_f64();
                b.tokens = (b.tokens + elapsed * self.tokens_per_second).min(b.capacity);
                b.last_refill = now;

                if b.tokens >= 1.0 {
                    b.tokens -= 1.0;
                    return;
                }
                (1.0 - b.tokens) / self.tokens_per_second
            };

            tokio::time::sleep(Duration::from_secs_f64(wait)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unlimited_never_blocks() {
        let limiter = RateLimiter::new(0, 0);
        assert!(!limiter.is_limited());
        for _ in 0..1000 {
            limiter.acquire().await;
        }
    }

    #[tokio::test]
    async fn test_negative_rpm_is_unlimited() {
        let limiter = RateLimiter::new(-5, 10);
        assert!(!limiter.is_limited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refill() {
        // 60 rpm = 1 token/sec, burst of 2.
        let limiter = RateLimiter::new(60, 2);

        // Burst drains instantly.
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        // Third request waits ~1s for a refill (paused clock auto-advances).
        limiter.acquire().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(900), "waited {:?}", waited);
        assert!(waited <= Duration::from_millis(1200), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_cap_at_burst() {
        let limiter = RateLimiter::new(60, 2);
        limiter.acquire().await;
        limiter.acquire().await;

        // A long idle period must not accumulate more than `burst` tokens.
        tokio::time::advance(Duration::from_secs(60)).await;

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(900));
    }
}
