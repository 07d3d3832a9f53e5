// crates/opspilot-detect/src/retry.rs
// ============================================================================
// Module: Retry With Backoff
// Description: Exponential backoff with jitter over an async operation,
// short-circuiting on non-retryable failures.
// Purpose: Give connectors, notifiers, and tool hosts a single shared retry
// policy instead of each hand-rolling one.
// Dependencies: rand, tokio::time
// ============================================================================

//! ## Overview
//! [`retry_with_backoff`] calls `op` until it succeeds, a caller-supplied
//! `is_retryable` predicate rejects the error, or `max_retries` is exhausted.
//! The delay before each retry is `min(base_delay * 2^attempt, max_delay)`
//! scaled by `1 + random() * jitter`, matching the admission contract the
//! rest of the runtime's outbound operations are specified against.

use std::future::Future;
use std::time::Duration;

/// Backoff policy parameters.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay, before jitter is applied.
    pub max_delay: Duration,
    /// Fractional jitter applied on top of the capped delay, in `[0, 1]`.
    pub jitter: f64,
}

impl RetryPolicy {
    /// Builds a policy with the given retry count and delay bounds and no
    /// jitter.
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter: 0.0,
        }
    }

    /// Attaches jitter, consuming and returning `self`.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    #[allow(clippy::cast_possible_truncation, reason = "jitter is clamped to [0, 1] and capped_ms to max_delay, so the scaled result fits comfortably in u64 millis")]
    fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis();
        let scale = 1u128 << attempt.min(63);
        let capped_ms = base_ms.saturating_mul(scale).min(self.max_delay.as_millis());
        let jittered = (capped_ms as f64) * (1.0 + rand::random::<f64>() * self.jitter);
        let millis = jittered.round().max(0.0) as u64;
        Duration::from_millis(millis)
    }
}

/// Retries `op` under `policy`, calling `is_retryable` on each failure to
/// decide whether to continue. Returns the last error once retries are
/// exhausted or `is_retryable` rejects it.
pub async fn retry_with_backoff<Op, Fut, T, E>(policy: &RetryPolicy, is_retryable: impl Fn(&E) -> bool, mut op: Op) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_retries || !is_retryable(&err) {
                    return Err(err);
                }
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::retry_with_backoff;
    use super::RetryPolicy;

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5));
        let result: Result<u32, &str> = retry_with_backoff(&policy, |_| true, || async {
            let count = attempts.fetch_add(1, Ordering::SeqCst);
            if count < 2 {
                Err("not yet")
            } else {
                Ok(count)
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_propagates_immediately() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(5));
        let result: Result<u32, &str> = retry_with_backoff(&policy, |_| false, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err("fatal")
        })
        .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_propagates_last_error() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5));
        let result: Result<u32, &str> = retry_with_backoff(&policy, |_| true, || async { Err("still failing") }).await;
        assert_eq!(result, Err("still failing"));
    }
}
