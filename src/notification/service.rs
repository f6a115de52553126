use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_service::Service;

use crate::config::PolicyTable;
use crate::error::NotifyError;
use crate::notification::{Gateway, Notification};
use crate::rate_limit::RateLimiter;

/// Gates notification delivery behind a per-`(user, type)` rate limit.
///
/// Holds only shared handles and the immutable policy table, so clones are
/// cheap and any number of callers can use it concurrently. There are no
/// retries at this layer: a denial is the final answer for that call.
#[derive(Clone)]
pub struct NotificationService {
    limiter: Arc<dyn RateLimiter>,
    gateway: Arc<dyn Gateway>,
    policies: Arc<PolicyTable>,
}

impl std::fmt::Debug for NotificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationService")
            .field("limiter", &"<dyn RateLimiter>")
            .field("gateway", &"<dyn Gateway>")
            .field("policies", &self.policies.len())
            .finish()
    }
}

impl NotificationService {
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        gateway: Arc<dyn Gateway>,
        policies: PolicyTable,
    ) -> Self {
        Self { limiter, gateway, policies: Arc::new(policies) }
    }

    /// Validate, rate-limit and deliver one notification.
    ///
    /// # Errors
    /// - `InvalidArguments` for an empty field or an unconfigured type; the
    ///   counter store is never touched.
    /// - `RateLimitExceeded` when the limiter denies; the gateway is not called.
    /// - `Internal` when the store or the gateway fails.
    pub async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if let Some(field) = notification.missing_field() {
            return Err(NotifyError::invalid(format!("notification has empty {field}")));
        }

        let policy = self.policies.get(&notification.kind).ok_or_else(|| {
            NotifyError::invalid(format!("unknown notification type '{}'", notification.kind))
        })?;

        let key = notification.rate_limit_key();
        let status = match self.limiter.check_limit(&key, policy.limit, policy.window).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(
                    kind = %notification.kind,
                    key = %key,
                    error = %e,
                    "rate limit check failed"
                );
                return Err(NotifyError::internal(
                    format!(
                        "checking rate limit for notification type {} (key {key})",
                        notification.kind
                    ),
                    e,
                ));
            }
        };

        if !status.is_allowed() {
            tracing::info!(
                kind = %notification.kind,
                key = %key,
                count = status.count,
                limit = policy.limit,
                "notification rate limited"
            );
            return Err(NotifyError::RateLimitExceeded(status));
        }

        self.gateway.send(&notification.user_id, &notification.message).await.map_err(|e| {
            tracing::warn!(kind = %notification.kind, error = %e, "gateway delivery failed");
            NotifyError::internal(
                format!("gateway error sending notification type {}", notification.kind),
                e,
            )
        })
    }
}

impl Service<Notification> for NotificationService {
    type Response = ();
    type Error = NotifyError;
    type Future = Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Backpressure comes from the limiter's answer, not from readiness.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, notification: Notification) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { service.send(&notification).await })
    }
}
