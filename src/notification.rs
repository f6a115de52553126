//! Notifications and the delivery sink they are forwarded to.
//!
//! - [`Notification`]: the unit being rate-limited.
//! - [`Gateway`]: the delivery sink, consulted only after the limiter allows.
//! - [`NotificationService`]: validation → policy → limiter → gateway.

use async_trait::async_trait;

use crate::error::GatewayError;

pub mod service;
pub use service::NotificationService;

/// A message for one user, rate-limited per `(user_id, kind)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Notification type; must match a configured policy.
    pub kind: String,
    /// Opaque recipient identifier.
    pub user_id: String,
    pub message: String,
}

impl Notification {
    pub fn new(
        kind: impl Into<String>,
        user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self { kind: kind.into(), user_id: user_id.into(), message: message.into() }
    }

    /// Name of the first empty field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.message.is_empty() {
            Some("message")
        } else if self.user_id.is_empty() {
            Some("user_id")
        } else if self.kind.is_empty() {
            Some("type")
        } else {
            None
        }
    }

    pub fn is_valid(&self) -> bool {
        self.missing_field().is_none()
    }

    /// Counter key shared by every instance limiting this user and type.
    pub fn rate_limit_key(&self) -> String {
        format!("{}-{}", self.user_id, self.kind)
    }
}

/// Delivery sink.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn send(&self, recipient_id: &str, message: &str) -> Result<(), GatewayError>;
}

/// Gateway that only logs deliveries.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingGateway;

#[async_trait]
impl Gateway for TracingGateway {
    async fn send(&self, recipient_id: &str, message: &str) -> Result<(), GatewayError> {
        tracing::info!(recipient = recipient_id, message, "sending notification");
        Ok(())
    }
}

/// Gateway that accepts and discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGateway;

#[async_trait]
impl Gateway for NoopGateway {
    async fn send(&self, _recipient_id: &str, _message: &str) -> Result<(), GatewayError> {
        Ok(())
    }
}
