//! Rate limiting primitives.
//!
//! This module provides the building blocks for rate limiting:
//! - [`RateLimiter`]: the single capability every algorithm implements.
//! - [`RateLimitStatus`]: the result of a check (Allowed/Denied, count, expiry).
//! - [`LimiterKind`]: the closed set of algorithms, selected once from configuration.
//!
//! # Architecture
//!
//! - **Logic**: [`FixedWindowCounter`] and [`SlidingWindowCounter`] (in `strategies`)
//!   handle the window math.
//! - **Storage**: [`CounterStore`] (in `store`) is the shared, external state. All
//!   coordination between callers, including callers in other processes, happens
//!   through its atomic batches; limiters hold no mutable state of their own.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::clock::Clock;
use crate::error::{ConfigError, StoreError};

pub mod store;
pub mod strategies;

pub use store::{CounterStore, InMemoryCounterStore, KeyTtl};
pub use strategies::{FixedWindowCounter, SlidingWindowCounter};

/// Terminal outcome of one limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitState {
    Allowed,
    Denied,
}

impl LimitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitState::Allowed => "allowed",
            LimitState::Denied => "denied",
        }
    }
}

impl fmt::Display for LimitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Allowed or Denied. Denied exactly when `count` exceeds the limit.
    pub state: LimitState,
    /// Events counted in the current window, including this one once recorded.
    pub count: u64,
    /// Unix-epoch milliseconds at which the window's accounting resets.
    pub expires_at_ms: u64,
}

impl RateLimitStatus {
    /// Build a status, deriving the state from `count` against `limit`.
    pub fn evaluate(count: u64, limit: u64, expires_at_ms: u64) -> Self {
        let state = if count > limit { LimitState::Denied } else { LimitState::Allowed };
        Self { state, count, expires_at_ms }
    }

    pub fn is_allowed(&self) -> bool {
        self.state == LimitState::Allowed
    }

    /// Reset instant as a `SystemTime`.
    pub fn expires_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.expires_at_ms)
    }
}

/// Core interface for rate limiting logic.
///
/// `check_limit` records one event for `key` and reports whether it fits within
/// `limit` events per `window`. An `Err` means the outcome is unknown; callers
/// must fail closed.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check_limit(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<RateLimitStatus, StoreError>;
}

#[async_trait::async_trait]
impl<L> RateLimiter for Arc<L>
where
    L: RateLimiter + ?Sized,
{
    async fn check_limit(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<RateLimitStatus, StoreError> {
        (**self).check_limit(key, limit, window).await
    }
}

/// The available algorithms, named as they appear in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimiterKind {
    FixedWindow,
    SlidingWindow,
}

impl LimiterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimiterKind::FixedWindow => "fixed_window",
            LimiterKind::SlidingWindow => "sliding_window",
        }
    }

    /// Construct the selected limiter over a shared store handle.
    pub fn build<S>(self, store: Arc<S>, clock: Arc<dyn Clock>) -> Arc<dyn RateLimiter>
    where
        S: CounterStore + 'static,
    {
        match self {
            LimiterKind::FixedWindow => Arc::new(FixedWindowCounter::new(store, clock)),
            LimiterKind::SlidingWindow => Arc::new(SlidingWindowCounter::new(store, clock)),
        }
    }

    /// Like [`build`](Self::build), bounding every check by `timeout`.
    pub fn build_with_deadline<S>(
        self,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Arc<dyn RateLimiter>
    where
        S: CounterStore + 'static,
    {
        Arc::new(crate::timeout::DeadlineLimiter::new(self.build(store, clock), timeout))
    }
}

impl fmt::Display for LimiterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimiterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "fixed_window" => Ok(LimiterKind::FixedWindow),
            "sliding_window" => Ok(LimiterKind::SlidingWindow),
            other => Err(ConfigError::Invalid {
                reason: format!(
                    "unknown rate limiter type '{other}' (expected fixed_window or sliding_window)"
                ),
            }),
        }
    }
}
