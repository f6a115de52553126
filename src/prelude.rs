//! Convenient re-exports for common notiflimit types.
pub use crate::{
    clock::{Clock, SystemClock},
    config::{LimitPolicy, PolicyTable, Settings},
    error::{NotifyError, StoreError},
    notification::{Gateway, Notification, NotificationService},
    rate_limit::{CounterStore, LimitState, LimiterKind, RateLimitStatus, RateLimiter},
    timeout::DeadlineLimiter,
};
