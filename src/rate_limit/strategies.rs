use crate::clock::{duration_millis, Clock};
use crate::error::StoreError;
use crate::rate_limit::store::{CounterStore, KeyTtl};
use crate::rate_limit::{RateLimitStatus, RateLimiter};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A Fixed Window counter.
///
/// One integer per key with a TTL of one window. The window starts at the first
/// event after the previous one expired and resets wholesale when the TTL runs
/// out. A burst straddling the boundary can admit up to `2 * limit` events.
///
/// Every call increments first and compares the post-increment total, so two
/// concurrent callers can never both pass a stale pre-check.
pub struct FixedWindowCounter<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> FixedWindowCounter<S>
where
    S: CounterStore,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl<S> RateLimiter for FixedWindowCounter<S>
where
    S: CounterStore,
{
    async fn check_limit(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<RateLimitStatus, StoreError> {
        let now = self.clock.now_millis();
        let (total, ttl) = self.store.increment_with_ttl(key).await?;
        let total = u64::try_from(total).map_err(|_| StoreError::UnexpectedReply {
            command: "INCR",
            key: key.to_string(),
            detail: format!("negative counter {total}"),
        })?;

        let expires_at_ms = match ttl {
            KeyTtl::Expires(remaining) => now.saturating_add(duration_millis(remaining)),
            KeyTtl::Missing | KeyTtl::Persistent => {
                // First event of a new window anchors its end. Racing first
                // events all write the same window, so last write wins.
                self.store.expire(key, window).await?;
                now.saturating_add(duration_millis(window))
            }
        };

        let status = RateLimitStatus::evaluate(total, limit, expires_at_ms);
        tracing::debug!(key, count = total, limit, state = %status.state, "fixed window check");
        Ok(status)
    }
}

/// A Sliding Window counter.
///
/// One sorted set per key holding a member per event, scored by its time in
/// milliseconds. Each check prunes events older than the window, records the
/// current one and counts what is left, all in one atomic store batch.
///
/// Denied events are recorded as well, so a caller that keeps hammering stays
/// denied until it backs off for a full window.
pub struct SlidingWindowCounter<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    precheck: bool,
}

impl<S> SlidingWindowCounter<S>
where
    S: CounterStore,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock, precheck: false }
    }

    /// Count in-window events before writing and skip the write when the key is
    /// already saturated. Costs a second round trip on the allowed path; the
    /// Allowed/Denied outcome is unchanged.
    pub fn with_precheck(mut self, enabled: bool) -> Self {
        self.precheck = enabled;
        self
    }

    // Time-ordered and collision resistant: two events in the same millisecond
    // still get distinct members.
    fn event_member() -> String {
        uuid::Uuid::now_v7().to_string()
    }
}

#[async_trait]
impl<S> RateLimiter for SlidingWindowCounter<S>
where
    S: CounterStore,
{
    async fn check_limit(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<RateLimitStatus, StoreError> {
        let now = self.clock.now_millis();
        let window_ms = duration_millis(window);
        let minimum_allowed = now.saturating_sub(window_ms);
        // Approximation: the oldest surviving member may reset sooner.
        let expires_at_ms = now.saturating_add(window_ms);

        if self.precheck {
            let in_window = self.store.count_since(key, minimum_allowed).await?;
            if in_window >= limit {
                // Report what the recording path would have counted.
                let status = RateLimitStatus::evaluate(in_window + 1, limit, expires_at_ms);
                tracing::debug!(key, count = status.count, limit, "sliding window precheck denied");
                return Ok(status);
            }
        }

        let member = Self::event_member();
        let count = self.store.record_event(key, &member, now, minimum_allowed).await?;

        let status = RateLimitStatus::evaluate(count, limit, expires_at_ms);
        tracing::debug!(key, count, limit, state = %status.state, "sliding window check");
        Ok(status)
    }
}
