//! # Fixed-Delay Retry
//!
//! Runs an async operation up to `max_attempts` times with a constant pause
//! between attempts. Used for cache and notification propagation and for
//! dialing backends at startup.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY};

/// Attempt budget and inter-attempt delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Number of attempts actually made; a zero budget still runs once
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// Returns the first success or the error of the final attempt. The delay
    /// is only applied between attempts, never after the last one.
    pub async fn execute<F, Fut, T, E>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.effective_attempts();
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            operation = operation_name,
                            attempt = attempt,
                            "✅ RETRY: Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) if attempt >= attempts => {
                    warn!(
                        operation = operation_name,
                        attempts = attempts,
                        error = %err,
                        "❌ RETRY: Attempt budget exhausted"
                    );
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_attempts = attempts,
                        retry_in_ms = self.delay.as_millis() as u64,
                        error = %err,
                        "🔄 RETRY: Attempt failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Dial a backend with bounded retries at startup.
pub async fn connect_with_retry<F, Fut, T, E>(
    backend: &str,
    attempts: u32,
    interval: Duration,
    connect: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    debug!(backend = backend, attempts = attempts, "🔌 Connecting to backend");
    RetryPolicy::new(attempts, interval)
        .execute(&format!("connect:{backend}"), connect)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let result = policy
            .execute("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(7)
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_returns_last_error_after_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let counter = calls.clone();
        let result: Result<(), String> = policy
            .execute("op", move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(format!("failure {n}"))
                }
            })
            .await;

        assert_eq!(result, Err("failure 3".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(0, Duration::from_millis(1));

        let _: Result<(), &str> = policy
            .execute("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("nope")
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_only_between_attempts() {
        let policy = RetryPolicy::default();
        let started = tokio::time::Instant::now();

        let _: Result<(), &str> = policy.execute("op", || async { Err("down") }).await;

        // 3 attempts, 2 pauses of 5s each
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_on_second_attempt() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result = policy
            .execute("op", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("transient")
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_connect_with_retry_uses_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> =
            connect_with_retry("redis", 2, Duration::from_millis(1), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("connection refused".to_string())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
