//! Bounded exponential-backoff retry for arbitrary async operations.
//!
//! This is a generic utility, not step-aware: the supervisor decides
//! *whether* something is retried; this module only decides *how*.

use std::future::Future;
use std::time::Duration;

/// Backoff parameters for [`retry`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Ceiling applied after each multiplication.
    pub max_delay: Duration,
    /// Factor applied to the delay after every failed attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries. Useful in tests and for callers that
    /// want the shared invocation path without the sleeps.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping between attempts
/// with exponential backoff. The last error is propagated if every attempt
/// fails. The attempt number (starting at 1) is passed to `op`.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;

    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                tracing::warn!(
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed, backing off"
                );
                tokio::time::sleep(delay).await;
                delay = mul_capped(delay, policy.backoff_multiplier, policy.max_delay);
            }
            Err(err) => return Err(err),
        }
    }

    unreachable!("loop returns on the last attempt")
}

fn mul_capped(delay: Duration, factor: f64, cap: Duration) -> Duration {
    let next = delay.as_secs_f64() * factor;
    Duration::from_secs_f64(next.min(cap.as_secs_f64()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_returns_first_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry(&RetryPolicy::none(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        };

        let result: Result<&str, String> = retry(&policy, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(format!("attempt {attempt} failed"))
                } else {
                    Ok("recovered")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_propagates_last_error_when_exhausted() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 3.0,
        };

        let result: Result<(), String> =
            retry(&policy, |attempt| async move { Err(format!("error {attempt}")) }).await;

        assert_eq!(result.unwrap_err(), "error 4");
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_delay_is_capped() {
        // 100ms * 10 would be 1s, but the cap holds it at 150ms. With
        // paused time the virtual clock advances exactly by the sleeps,
        // so total elapsed bounds the delays actually used.
        let start = tokio::time::Instant::now();
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(150),
            backoff_multiplier: 10.0,
        };

        let _: Result<(), &str> = retry(&policy, |_| async { Err("nope") }).await;

        let elapsed = start.elapsed();
        assert_eq!(elapsed, Duration::from_millis(250));
    }
}
