//! Fixed-delay retry for transient external calls.
//!
//! Deliberately linear: a constant delay between attempts, no backoff
//! multiplier. The only callers are short one-shot deployment jobs where
//! total wait time must stay predictable.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How often and how patiently to retry a transient call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub attempts: u32,

    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Run `op` until it succeeds or the attempt budget is exhausted.
    ///
    /// Returns the first success, or `(attempts_made, last_error)` once all
    /// attempts failed. `what` names the call in warning logs.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, (u32, E)>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(call = %what, attempt, max_attempts = attempts, error = %e, "attempt failed");
                    if attempt >= attempts {
                        return Err((attempt, e));
                    }
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_first_attempt_success_makes_one_call() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let result: Result<u32, (u32, String)> = policy
            .run("noop", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<u32, String>(7) }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempt_count() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let result: Result<(), (u32, String)> = policy
            .run("always_fails", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), String>("connection refused".to_string()) }
            })
            .await;

        let (attempts, last) = result.unwrap_err();
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(last, "connection refused");
    }

    #[tokio::test]
    async fn test_recovers_on_later_attempt() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let result: Result<&str, (u32, String)> = policy
            .run("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("not yet".to_string())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_clamps_to_one() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(0, Duration::from_millis(1));

        let result: Result<(), (u32, String)> = policy
            .run("clamped", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), String>("nope".to_string()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
