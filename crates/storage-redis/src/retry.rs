//! Bounded retry for transient storage failures.
//!
//! [`with_retry`] wraps an async operation with automatic retry on transient
//! errors (connection failures, timeouts). Non-transient errors — a missing
//! key, a rejected command — are returned immediately. The retry budget is
//! bounded: once the configured attempts are exhausted, the last transient
//! error is surfaced to the caller as a typed error rather than looping
//! against an unavailable backend.
//!
//! # Backoff Strategy
//!
//! - Base delay doubles with each attempt: `initial_backoff * 2^attempt`
//! - Delay is capped at `max_backoff`
//! - Random jitter of 0–50% of the computed delay is added to prevent
//!   thundering-herd effects across workers hammering a recovering backend

use std::future::Future;
use std::time::Duration;

use gatehouse_storage::StorageResult;
use rand::Rng;

use crate::config::RetryConfig;

/// Executes `operation` with automatic retry on transient errors.
///
/// Returns the result of the first successful call, or the last error once
/// all attempts are exhausted. Only errors where
/// [`StorageError::is_transient`](gatehouse_storage::StorageError::is_transient)
/// returns `true` are retried.
pub(crate) async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> StorageResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "operation succeeded after retry",
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = compute_backoff(config, attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient storage error, retrying after backoff",
                );
                tokio::time::sleep(delay).await;
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    // All retries exhausted; surface the last transient error.
    Err(last_error.unwrap_or_else(|| {
        gatehouse_storage::StorageError::command("retry loop completed without result or error")
    }))
}

/// Computes the backoff duration for the given attempt number:
/// `min(initial_backoff * 2^attempt, max_backoff) + random(0..=50% of delay)`.
fn compute_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let base =
        config.initial_backoff.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = base.min(config.max_backoff);

    let jitter_range = capped.as_millis() as u64 / 2;
    if jitter_range > 0 {
        let jitter = rand::rng().random_range(0..=jitter_range);
        capped + Duration::from_millis(jitter)
    } else {
        capped
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use gatehouse_storage::StorageError;

    use super::*;

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig::builder()
            .max_retries(max_retries)
            .initial_backoff(Duration::from_millis(1))
            .max_backoff(Duration::from_millis(5))
            .build()
    }

    #[test]
    fn backoff_grows_exponentially_within_bounds() {
        let config = RetryConfig::builder()
            .max_retries(5)
            .initial_backoff(Duration::from_millis(100))
            .max_backoff(Duration::from_secs(10))
            .build();

        let d0 = compute_backoff(&config, 0);
        assert!(d0 >= Duration::from_millis(100) && d0 <= Duration::from_millis(150));

        let d2 = compute_backoff(&config, 2);
        assert!(d2 >= Duration::from_millis(400) && d2 <= Duration::from_millis(600));
    }

    #[test]
    fn backoff_is_capped_at_max() {
        let config = RetryConfig::builder()
            .max_retries(10)
            .initial_backoff(Duration::from_secs(1))
            .max_backoff(Duration::from_secs(5))
            .build();

        // Attempt 5: base = 32s, capped at 5s (+ up to 50% jitter).
        let d = compute_backoff(&config, 5);
        assert!(d >= Duration::from_secs(5) && d <= Duration::from_millis(7500));
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt_without_retrying() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_config(3), "test_op", || {
            calls.fetch_add(1, Ordering::Relaxed);
            async { Ok::<_, StorageError>(42) }
        })
        .await;

        assert_eq!(result.ok(), Some(42));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_config(3), "test_op", || {
            let attempt = calls.fetch_add(1, Ordering::Relaxed);
            async move {
                if attempt < 2 { Err(StorageError::connection("temporary")) } else { Ok(42) }
            }
        })
        .await;

        assert_eq!(result.ok(), Some(42));
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: StorageResult<i32> = with_retry(&fast_config(3), "test_op", || {
            calls.fetch_add(1, Ordering::Relaxed);
            async { Err(StorageError::not_found("k")) }
        })
        .await;

        assert!(matches!(result, Err(StorageError::NotFound { .. })));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_the_last_transient_error() {
        let calls = AtomicU32::new(0);
        let result: StorageResult<i32> = with_retry(&fast_config(2), "test_op", || {
            calls.fetch_add(1, Ordering::Relaxed);
            async { Err(StorageError::timeout()) }
        })
        .await;

        assert!(matches!(result, Err(StorageError::Timeout)));
        assert_eq!(calls.load(Ordering::Relaxed), 3); // 1 initial + 2 retries
    }

    #[tokio::test]
    async fn zero_max_retries_disables_retrying() {
        let calls = AtomicU32::new(0);
        let result: StorageResult<i32> = with_retry(&fast_config(0), "test_op", || {
            calls.fetch_add(1, Ordering::Relaxed);
            async { Err(StorageError::connection("down")) }
        })
        .await;

        assert!(matches!(result, Err(StorageError::Connection { .. })));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
