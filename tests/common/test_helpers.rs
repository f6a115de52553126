use async_trait::async_trait;
use notiflimit::{
    GatewayError, InMemoryCounterStore, LimitPolicy, LimiterKind, ManualClock, PolicyTable,
    RateLimitStatus, RateLimiter, StoreError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

/// `{ status: 5 per 1000ms }`, the policy used across the scenarios.
pub fn status_policies() -> PolicyTable {
    PolicyTable::new([LimitPolicy {
        kind: "status".into(),
        limit: 5,
        window: Duration::from_millis(1000),
    }])
    .expect("valid policies")
}

/// Limiter spy: counts calls, then delegates to a real limiter over an
/// in-memory store sharing `clock`.
pub struct SpyLimiter {
    inner: Arc<dyn RateLimiter>,
    calls: AtomicUsize,
    keys: Mutex<Vec<String>>,
}

impl SpyLimiter {
    pub fn new(kind: LimiterKind, clock: &ManualClock) -> Arc<Self> {
        let store = Arc::new(InMemoryCounterStore::new(Arc::new(clock.clone())));
        Arc::new(Self {
            inner: kind.build(store, Arc::new(clock.clone())),
            calls: AtomicUsize::new(0),
            keys: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl RateLimiter for SpyLimiter {
    async fn check_limit(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<RateLimitStatus, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().unwrap().push(key.to_string());
        self.inner.check_limit(key, limit, window).await
    }
}

/// Gateway spy: records deliveries, optionally failing every call.
#[derive(Default)]
pub struct SpyGateway {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl SpyGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { fail: true, ..Self::default() })
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl notiflimit::Gateway for SpyGateway {
    async fn send(&self, recipient_id: &str, message: &str) -> Result<(), GatewayError> {
        self.sent.lock().unwrap().push((recipient_id.to_string(), message.to_string()));
        if self.fail {
            return Err(GatewayError::Delivery {
                recipient: recipient_id.to_string(),
                reason: "sink unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Slow limiter: sleeps for `delay` before allowing. Counts calls.
pub struct HangingLimiter {
    delay: Duration,
    calls: AtomicUsize,
}

impl HangingLimiter {
    pub fn new(delay: Duration) -> Self {
        Self { delay, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateLimiter for HangingLimiter {
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

#[derive(Clone)]
struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;
    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

struct SharedGuard(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Captured log output of the current thread.
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    _guard: DefaultGuard,
}

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8(self.buffer.lock().unwrap().clone()).expect("utf8 logs")
    }
}

/// Route events on this thread into a buffer until the capture is dropped.
/// Only meaningful on a current-thread runtime.
pub fn capture_logs() -> LogCapture {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
        .with_writer(BoxMakeWriter::new(SharedWriter(buffer.clone())))
        .with_ansi(false)
        .without_time()
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    LogCapture { buffer, _guard: guard }
}
