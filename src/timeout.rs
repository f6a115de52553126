//! Deadline wrapper for rate limiters.
//!
//! Dropping a `check_limit` future already cancels the in-flight store call;
//! `DeadlineLimiter` does that on a timer. An expired deadline is an error, so a
//! slow store makes the check fail closed instead of letting the event through.

use crate::error::StoreError;
use crate::rate_limit::{RateLimitStatus, RateLimiter};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DeadlineLimiter<L> {
    inner: L,
    timeout: Duration,
}

impl<L> DeadlineLimiter<L> {
    /// Wrap `inner`. Panics if `timeout` is zero or `Duration::MAX`.
    pub fn new(inner: L, timeout: Duration) -> Self {
        assert!(
            timeout > Duration::ZERO && timeout < Duration::MAX,
            "deadline must be non-zero and finite",
        );
        Self { inner, timeout }
    }

    /// Inspect the configured deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait::async_trait]
impl<L> RateLimiter for DeadlineLimiter<L>
where
    L: RateLimiter,
{
    async fn check_limit(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<RateLimitStatus, StoreError> {
        let start = Instant::now();
        match tokio::time::timeout(self.timeout, self.inner.check_limit(key, limit, window)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    key,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "rate limit check exceeded deadline"
                );
                Err(StoreError::DeadlineExceeded { timeout: self.timeout })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::LimitState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct SlowLimiter {
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl RateLimiter for SlowLimiter {
        async fn check_limit(
            &self,
            _key: &str,
            limit: u64,
            _window: Duration,
        ) -> Result<RateLimitStatus, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(RateLimitStatus::evaluate(1, limit, 0))
        }
    }

    #[tokio::test]
    async fn completes_before_deadline() {
        let limiter = DeadlineLimiter::new(
            SlowLimiter { delay: Duration::from_millis(5), ..Default::default() },
            Duration::from_millis(200),
        );
        let status = limiter.check_limit("k", 1, Duration::from_secs(1)).await.unwrap();
        assert_eq!(status.state, LimitState::Allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_fails_closed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let limiter = DeadlineLimiter::new(
            SlowLimiter { delay: Duration::from_secs(5), calls: calls.clone() },
            Duration::from_millis(50),
        );
        let err = limiter.check_limit("k", 10, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_deadline_exceeded());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "should have started the check");
    }

    #[test]
    #[should_panic(expected = "deadline must be non-zero")]
    fn zero_deadline_panics() {
        let _ = DeadlineLimiter::new(SlowLimiter::default(), Duration::ZERO);
    }
}
