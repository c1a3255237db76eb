//! Retry with exponential backoff for outbound calls
//!
//! This module runs an arbitrary asynchronous operation until it succeeds or
//! the retry budget is exhausted. Whether an error is worth retrying is not
//! decided here: the caller supplies an explicit `is_retryable` classifier,
//! keeping classification separate from the retry control flow.
//!
//! The backoff schedule for attempt *n* is
//! `min(max_delay, initial_delay * backoff_factor^(n-1))`, optionally
//! randomized within that bound (full jitter). The delay is applied before
//! each retry, never before the first attempt.

use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Backoff and retry-budget configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (default 5, i.e. 4 retries)
    pub max_attempts: u32,

    /// Delay before the first retry (default 1s)
    pub initial_delay: Duration,

    /// Upper bound on any single delay (default 30s)
    pub max_delay: Duration,

    /// Multiplier applied per attempt (default 2.0)
    pub backoff_factor: f64,

    /// Randomize each delay within its exponential bound (default on)
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy with near-zero delays, for tests
    pub fn fast() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_factor: 2.0,
            jitter: false,
        }
    }

    /// Compute the backoff delay applied after the given 1-based attempt.
    ///
    /// The returned duration never exceeds `max_delay`. With jitter enabled
    /// the delay is drawn uniformly from `[0, bound]`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let bound = (self.initial_delay.as_millis() as f64
            * self.backoff_factor.powi(exponent as i32))
        .min(self.max_delay.as_millis() as f64);

        let millis = if self.jitter {
            rand::thread_rng().gen_range(0.0..=bound)
        } else {
            bound
        };

        Duration::from_millis(millis as u64)
    }
}

/// Execute `operation` under the given policy, retrying transient failures.
///
/// `operation` is re-invoked from scratch on every attempt. `is_retryable`
/// classifies each error: `false` aborts immediately and the error is
/// returned unchanged; `true` consumes one retry from the budget. When the
/// budget is exhausted the last error is returned unchanged.
pub async fn execute<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: C,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    C: Fn(&E) -> bool,
{
    let mut attempt: u32 = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retryable(&err) {
                    tracing::debug!("Non-retryable error on attempt {}: {}", attempt, err);
                    return Err(err);
                }

                if attempt >= policy.max_attempts {
                    tracing::warn!(
                        "Retry budget exhausted after {} attempts: {}",
                        attempt,
                        err
                    );
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    "Attempt {}/{} failed: {} ({} retries remaining, next in {:?})",
                    attempt,
                    policy.max_attempts,
                    err,
                    policy.max_attempts - attempt,
                    delay
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("transient")]
        Transient,
        #[error("fatal")]
        Fatal,
    }

    fn classify(err: &TestError) -> bool {
        matches!(err, TestError::Transient)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = execute(
            &RetryPolicy::fast(),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TestError>(42) }
            },
            classify,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = execute(
            &RetryPolicy::fast(),
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(TestError::Transient)
                    } else {
                        Ok("done")
                    }
                }
            },
            classify,
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        // 3 failures + 1 success
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute(
            &RetryPolicy::fast(),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Fatal) }
            },
            classify,
        )
        .await;

        assert!(matches!(result.unwrap_err(), TestError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::fast()
        };
        let result: Result<(), _> = execute(
            &policy,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Transient) }
            },
            classify,
        )
        .await;

        assert!(matches!(result.unwrap_err(), TestError::Transient));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delay_schedule_without_jitter() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_factor: 2.0,
            jitter: false,
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        // Capped at max_delay
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(30_000));
    }

    #[test]
    fn test_jittered_delay_stays_within_bound() {
        let policy = RetryPolicy {
            jitter: true,
            ..RetryPolicy::default()
        };

        for attempt in 1..=8 {
            let bound = RetryPolicy {
                jitter: false,
                ..policy.clone()
            }
            .delay_for_attempt(attempt);
            for _ in 0..20 {
                assert!(policy.delay_for_attempt(attempt) <= bound);
            }
        }
    }
}
