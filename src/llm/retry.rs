// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Exponential-backoff retry for transient provider failures.
//!
//! Only errors the taxonomy marks retryable (rate limits, 5xx, network,
//! timeout) are retried; everything else surfaces immediately. When retries
//! exhaust, the last error observed becomes the caller-visible one.
//!
//! Cancellation: callers race the returned future against their cancel
//! token; dropping it aborts the in-flight attempt and any pending backoff.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::ProviderError;

/// Backoff policy for retried requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the initial try.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each attempt.
    pub base_delay: Duration,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Policy from a configured retry count.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Delay for the given zero-based attempt number.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        exp.min(self.max_delay)
    }
}

/// Run an operation with exponential backoff on retryable errors.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                debug!(
                    operation,
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result = with_retry(&policy, "test", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::RateLimited("429".to_string()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<(), _> = with_retry(&policy, "test", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ProviderError::Auth("bad key".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Auth(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_error_surfaces_after_exhaustion() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::with_max_retries(2);

        let result: Result<(), _> = with_retry(&policy, "test", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                Err(ProviderError::Server {
                    message: format!("attempt {}", n),
                    status_code: 500,
                })
            }
        })
        .await;

        // Initial try + 2 retries; the final attempt's error surfaces.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        match result {
            Err(ProviderError::Server { message, .. }) => assert_eq!(message, "attempt 2"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
