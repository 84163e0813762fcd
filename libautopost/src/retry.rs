//! Retry with exponential backoff for transient external failures
//!
//! Every call to the model API and to a publishing platform goes through
//! [`retry`]. Only failures classified as transient (connection errors,
//! timeouts, HTTP 429/503 and provider overload messages) are retried; any
//! other error is returned on the first attempt.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{AutopostError, ModelError, PlatformError};

/// Errors that know whether another attempt may succeed
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for AutopostError {
    fn is_transient(&self) -> bool {
        AutopostError::is_transient(self)
    }
}

impl Retryable for PlatformError {
    fn is_transient(&self) -> bool {
        PlatformError::is_transient(self)
    }
}

impl Retryable for ModelError {
    fn is_transient(&self) -> bool {
        ModelError::is_transient(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Upper bound of the random extra delay added to each backoff
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Policy that makes a single attempt
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry `retry` (1-indexed): `base * 2^(retry-1) + uniform(0, jitter)`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let backoff = self.base_delay.saturating_mul(1u32 << exponent);
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        backoff + Duration::from_millis(extra)
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out
///
/// After `max_retries` retries the last error is returned unchanged.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T, E>
where
    E: Retryable + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retries = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if retries > 0 {
                    info!("{} succeeded after {} retries", label, retries);
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && retries < policy.max_retries => {
                retries += 1;
                let delay = policy.delay_for(retries);
                warn!(
                    "Transient error in {} (retry {}/{}): {}. Retrying in {:.1}s...",
                    label,
                    retries,
                    policy.max_retries,
                    e,
                    delay.as_secs_f64()
                );
                sleep(delay).await;
            }
            Err(e) => {
                if retries > 0 && e.is_transient() {
                    warn!("{} failed after {} retries: {}", label, retries, e);
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = RetryPolicy::default();
        for (retry, base) in [(1, 2), (2, 4), (3, 8)] {
            let delay = policy.delay_for(retry);
            assert!(delay >= Duration::from_secs(base));
            assert!(delay <= Duration::from_secs(base + 1));
        }
    }

    #[test]
    fn test_delay_without_jitter_is_exact() {
        let policy = RetryPolicy {
            jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_exhausts_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let policy = RetryPolicy::default();
        let started = Instant::now();

        let result: Result<(), PlatformError> = retry(&policy, "test", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(PlatformError::RateLimit("HTTP 429".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(PlatformError::RateLimit(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 2 + 4 + 8 seconds of backoff plus up to 3 seconds of jitter
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(14));
        assert!(elapsed <= Duration::from_secs(17));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let started = Instant::now();

        let result: Result<(), ModelError> = retry(&RetryPolicy::default(), "test", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ModelError::Unauthorized("bad key".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<&str, AutopostError> = retry(&RetryPolicy::default(), "test", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ModelError::Provider("RESOURCE_EXHAUSTED".to_string()).into())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_none_makes_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), PlatformError> = retry(&RetryPolicy::none(), "test", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(PlatformError::Network("reset".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
