#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # notiflimit
//!
//! Distributed rate limiting for outbound notifications. Every `(user, type)`
//! pair gets one counter in a shared store, so any number of processes can
//! enforce the same limit without talking to each other.
//!
//! ## Features
//!
//! - **Fixed window** counter: `INCR` + TTL, increment-then-check
//! - **Sliding window** counter: sorted set of event timestamps, pruned and
//!   counted in one atomic batch
//! - **Pluggable store** via [`CounterStore`]: in-memory here, Redis in
//!   `notiflimit-redis`
//! - **Deadlines** that fail closed when the store is slow
//! - **Notification service** that validates, limits and forwards to a
//!   [`Gateway`]
//!
//! ## Quick Start
//!
//! ```rust
//! use notiflimit::{
//!     InMemoryCounterStore, LimitPolicy, LimiterKind, Notification, NotificationService,
//!     PolicyTable, SystemClock, TracingGateway,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let clock = Arc::new(SystemClock);
//!     let store = Arc::new(InMemoryCounterStore::new(clock.clone()));
//!     let limiter = LimiterKind::SlidingWindow.build(store, clock);
//!     let policies = PolicyTable::new([LimitPolicy {
//!         kind: "status".into(),
//!         limit: 2,
//!         window: Duration::from_secs(60),
//!     }])
//!     .unwrap();
//!
//!     let service = NotificationService::new(limiter, Arc::new(TracingGateway), policies);
//!     let n = Notification::new("status", "user-1", "build finished");
//!     assert!(service.send(&n).await.is_ok());
//!     assert!(service.send(&n).await.is_ok());
//!     assert!(service.send(&n).await.unwrap_err().is_rate_limited());
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod notification;
pub mod prelude;
pub mod rate_limit;
pub mod timeout;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LimitPolicy, PolicyTable, Settings};
pub use error::{BoxError, ConfigError, GatewayError, NotifyError, StoreError};
pub use notification::{Gateway, NoopGateway, Notification, NotificationService, TracingGateway};
pub use rate_limit::{
    CounterStore, FixedWindowCounter, InMemoryCounterStore, KeyTtl, LimitState, LimiterKind,
    RateLimitStatus, RateLimiter, SlidingWindowCounter,
};
pub use timeout::DeadlineLimiter;
