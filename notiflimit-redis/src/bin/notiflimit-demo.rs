//! Sends a stream of `status` notifications for one user through a Redis-backed
//! limiter and logs which ones get through.
//!
//! Usage: `notiflimit-demo [config.json] [count]`

use notiflimit::{NotificationService, Settings, SystemClock, TracingGateway};
use notiflimit::{Clock, Notification};
use notiflimit_redis::RedisCounterStore;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_COUNT: usize = 9999;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "example_config.json".to_string());
    let count = match args.next() {
        Some(raw) => raw.parse()?,
        None => DEFAULT_COUNT,
    };

    let settings = Settings::load(&config_path)?;
    let store = Arc::new(RedisCounterStore::connect(&settings.redis.url()).await?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let kind = settings.limiter_kind()?;
    let limiter = match settings.check_timeout() {
        Some(timeout) => kind.build_with_deadline(store, clock, timeout),
        None => kind.build(store, clock),
    };

    let service = NotificationService::new(limiter, Arc::new(TracingGateway), settings.policies()?);

    let user_id = uuid::Uuid::new_v4().to_string();
    let mut delivered = 0usize;
    for i in 0..count {
        let notification =
            Notification::new("status", user_id.as_str(), format!("Hello, world! [{i}]"));
        match service.send(&notification).await {
            Ok(()) => delivered += 1,
            Err(e) => tracing::warn!(error = %e, "failed to send notification"),
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    tracing::info!(delivered, attempted = count, limiter = %kind, "done");
    Ok(())
}
