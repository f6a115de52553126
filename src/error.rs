//! Error types for the limiter, the counter store and the notification service.
use std::time::Duration;

use crate::rate_limit::RateLimitStatus;

/// Boxed foreign error carried as a `source`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure talking to the shared counter store.
///
/// A `StoreError` means the outcome of a check is unknown. It must never be
/// read as either Allowed or Denied.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// A command or atomic batch failed at the transport or server level.
    #[error("{command} failed for key {key}: {source}")]
    Command {
        command: &'static str,
        key: String,
        #[source]
        source: BoxError,
    },
    /// The store answered with something the protocol does not allow.
    #[error("unexpected {command} reply for key {key}: {detail}")]
    UnexpectedReply { command: &'static str, key: String, detail: String },
    /// The key holds a value of the other algorithm's shape.
    #[error("key {key} holds a value of the wrong type")]
    WrongType { key: String },
    /// The check did not finish before its deadline.
    #[error("counter store call exceeded deadline of {timeout:?}")]
    DeadlineExceeded { timeout: Duration },
}

impl StoreError {
    /// Wrap a foreign error raised by `command` against `key`.
    pub fn command(
        command: &'static str,
        key: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        StoreError::Command { command, key: key.into(), source: source.into() }
    }

    /// Check if the error is a deadline expiry.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }
}

/// Failure reported by a delivery [`Gateway`](crate::notification::Gateway).
#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    /// The sink refused or failed to deliver the message.
    #[error("delivery to {recipient} failed: {reason}")]
    Delivery { recipient: String, reason: String },
    /// Any other transport-level failure.
    #[error(transparent)]
    Other(BoxError),
}

/// Error returned by [`NotificationService::send`](crate::notification::NotificationService::send).
#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    /// Malformed notification or unknown type. Nothing touched the store.
    #[error("invalid arguments: {reason}")]
    InvalidArguments { reason: String },
    /// The per-key limit is exhausted for the current window.
    #[error(
        "rate limit exceeded: state={}, count={}, expires_at_ms={}",
        .0.state, .0.count, .0.expires_at_ms
    )]
    RateLimitExceeded(RateLimitStatus),
    /// The store or the gateway failed; the outcome is indeterminate.
    #[error("internal error: {context}: {source}")]
    Internal {
        context: String,
        #[source]
        source: BoxError,
    },
}

impl NotifyError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        NotifyError::InvalidArguments { reason: reason.into() }
    }

    pub(crate) fn internal(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        NotifyError::Internal { context: context.into(), source: source.into() }
    }

    /// Check if the notification was rejected before any store interaction.
    pub fn is_invalid_arguments(&self) -> bool {
        matches!(self, Self::InvalidArguments { .. })
    }

    /// Check if the notification was denied by the rate limiter.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded(_))
    }

    /// Check if the error is an infrastructure failure.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Borrow the denial status if this is a `RateLimitExceeded`.
    pub fn status(&self) -> Option<&RateLimitStatus> {
        match self {
            Self::RateLimitExceeded(status) => Some(status),
            _ => None,
        }
    }
}

/// Errors while loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}
