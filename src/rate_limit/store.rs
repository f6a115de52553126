use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::clock::{duration_millis, Clock};
use crate::error::StoreError;

/// Remaining lifetime of a key, as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist (Redis `PTTL` reply `-2`).
    Missing,
    /// The key exists without an expiry (Redis `PTTL` reply `-1`).
    Persistent,
    /// The key expires after this duration.
    Expires(Duration),
}

impl KeyTtl {
    /// Decode a raw `PTTL` reply.
    pub fn from_pttl(reply: i64) -> Option<Self> {
        match reply {
            -2 => Some(KeyTtl::Missing),
            -1 => Some(KeyTtl::Persistent),
            ms if ms >= 0 => Some(KeyTtl::Expires(Duration::from_millis(ms as u64))),
            _ => None,
        }
    }
}

/// Abstract interface to the shared counter store.
///
/// Each method is a single atomic unit on the store side. Implementations must
/// not split `increment_with_ttl` or `record_event` into separately observable
/// steps: other clients (in this process or another) may be checking the same
/// key concurrently.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the integer at `key` (absent counts as zero) and
    /// read its TTL. Returns the post-increment total.
    async fn increment_with_ttl(&self, key: &str) -> Result<(i64, KeyTtl), StoreError>;

    /// Set the expiry of `key`. A missing key is left alone.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Atomically prune members scored below `prune_below_ms`, add `member` at
    /// `score_ms`, and count the remaining members.
    async fn record_event(
        &self,
        key: &str,
        member: &str,
        score_ms: u64,
        prune_below_ms: u64,
    ) -> Result<u64, StoreError>;

    /// Count members scored at or above `min_score_ms` without mutating.
    async fn count_since(&self, key: &str, min_score_ms: u64) -> Result<u64, StoreError>;
}

#[async_trait]
impl<S> CounterStore for Arc<S>
where
    S: CounterStore + ?Sized,
{
    async fn increment_with_ttl(&self, key: &str) -> Result<(i64, KeyTtl), StoreError> {
        (**self).increment_with_ttl(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).expire(key, ttl).await
    }

    async fn record_event(
        &self,
        key: &str,
        member: &str,
        score_ms: u64,
        prune_below_ms: u64,
    ) -> Result<u64, StoreError> {
        (**self).record_event(key, member, score_ms, prune_below_ms).await
    }

    async fn count_since(&self, key: &str, min_score_ms: u64) -> Result<u64, StoreError> {
        (**self).count_since(key, min_score_ms).await
    }
}

#[derive(Debug, Clone)]
enum Value {
    Counter(i64),
    // member -> score
    Events(HashMap<String, u64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<u64>,
}

/// Single-process counter store.
///
/// One mutex stands in for the single-threaded command loop of a real store
/// server, so every trait method is atomic with respect to the others. Expired
/// keys are dropped lazily on access.
///
/// Sliding window event sets carry no expiry, so a key that is never checked
/// again keeps its entry and the map grows with the number of distinct keys.
/// Long-lived processes should call [`purge_events_before`] (with
/// `now - longest window`) and [`purge_expired`] from a housekeeping task.
///
/// [`purge_events_before`]: InMemoryCounterStore::purge_events_before
/// [`purge_expired`]: InMemoryCounterStore::purge_expired
#[derive(Debug, Clone)]
pub struct InMemoryCounterStore {
    data: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { data: Arc::new(Mutex::new(HashMap::new())), clock }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // A panic while holding the guard leaves the map consistent: every
        // mutation below is a single insert/remove.
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evict_expired(map: &mut HashMap<String, Entry>, key: &str, now: u64) {
        let expired =
            matches!(map.get(key), Some(Entry { expires_at: Some(at), .. }) if *at <= now);
        if expired {
            map.remove(key);
        }
    }

    /// Current integer value at `key`, if it is a live counter.
    pub fn counter_value(&self, key: &str) -> Option<i64> {
        let now = self.clock.now_millis();
        let mut map = self.lock();
        Self::evict_expired(&mut map, key, now);
        match map.get(key) {
            Some(Entry { value: Value::Counter(v), .. }) => Some(*v),
            _ => None,
        }
    }

    /// Number of members in the event set at `key`, if it is a live set.
    pub fn event_count(&self, key: &str) -> Option<u64> {
        let now = self.clock.now_millis();
        let mut map = self.lock();
        Self::evict_expired(&mut map, key, now);
        match map.get(key) {
            Some(Entry { value: Value::Events(events), .. }) => Some(events.len() as u64),
            _ => None,
        }
    }

    /// Remaining lifetime of `key`.
    pub fn ttl(&self, key: &str) -> KeyTtl {
        let now = self.clock.now_millis();
        let mut map = self.lock();
        Self::evict_expired(&mut map, key, now);
        ttl_of(map.get(key), now)
    }

    /// Drop every expired key. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, entry| !matches!(entry.expires_at, Some(at) if at <= now));
        let removed = before - map.len();
        if removed > 0 {
            tracing::debug!(removed, "purged expired counter store keys");
        }
        removed
    }

    /// Drop event members scored below `cutoff_ms`, removing sets left empty.
    /// Returns how many keys were removed.
    pub fn purge_events_before(&self, cutoff_ms: u64) -> usize {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, entry| match &mut entry.value {
            Value::Events(events) => {
                events.retain(|_, score| *score >= cutoff_ms);
                !events.is_empty()
            }
            Value::Counter(_) => true,
        });
        let removed = before - map.len();
        if removed > 0 {
            tracing::debug!(removed, cutoff_ms, "purged stale event sets");
        }
        removed
    }
}

fn ttl_of(entry: Option<&Entry>, now: u64) -> KeyTtl {
    match entry {
        None => KeyTtl::Missing,
        Some(Entry { expires_at: None, .. }) => KeyTtl::Persistent,
        Some(Entry { expires_at: Some(at), .. }) => {
            KeyTtl::Expires(Duration::from_millis(at.saturating_sub(now)))
        }
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_with_ttl(&self, key: &str) -> Result<(i64, KeyTtl), StoreError> {
        let now = self.clock.now_millis();
        let mut map = self.lock();
        Self::evict_expired(&mut map, key, now);
        let entry = map
            .entry(key.to_string())
            .or_insert(Entry { value: Value::Counter(0), expires_at: None });
        let total = match &mut entry.value {
            Value::Counter(v) => {
                *v = v.checked_add(1).ok_or_else(|| StoreError::UnexpectedReply {
                    command: "INCR",
                    key: key.to_string(),
                    detail: "increment would overflow".to_string(),
                })?;
                *v
            }
            Value::Events(_) => return Err(StoreError::WrongType { key: key.to_string() }),
        };
        Ok((total, ttl_of(Some(&*entry), now)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = self.clock.now_millis();
        let mut map = self.lock();
        Self::evict_expired(&mut map, key, now);
        if let Some(entry) = map.get_mut(key) {
            entry.expires_at = Some(now.saturating_add(duration_millis(ttl)));
        }
        Ok(())
    }

    async fn record_event(
        &self,
        key: &str,
        member: &str,
        score_ms: u64,
        prune_below_ms: u64,
    ) -> Result<u64, StoreError> {
        let now = self.clock.now_millis();
        let mut map = self.lock();
        Self::evict_expired(&mut map, key, now);
        let entry = map
            .entry(key.to_string())
            .or_insert_with(|| Entry { value: Value::Events(HashMap::new()), expires_at: None });
        match &mut entry.value {
            Value::Events(events) => {
                events.retain(|_, score| *score >= prune_below_ms);
                events.insert(member.to_string(), score_ms);
                Ok(events.len() as u64)
            }
            Value::Counter(_) => Err(StoreError::WrongType { key: key.to_string() }),
        }
    }

    async fn count_since(&self, key: &str, min_score_ms: u64) -> Result<u64, StoreError> {
        let now = self.clock.now_millis();
        let mut map = self.lock();
        Self::evict_expired(&mut map, key, now);
        match map.get(key) {
            None => Ok(0),
            Some(Entry { value: Value::Events(events), .. }) => {
                Ok(events.values().filter(|score| **score >= min_score_ms).count() as u64)
            }
            Some(_) => Err(StoreError::WrongType { key: key.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (InMemoryCounterStore, ManualClock) {
        let clock = ManualClock::new(10_000);
        (InMemoryCounterStore::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn pttl_sentinels_decode() {
        assert_eq!(KeyTtl::from_pttl(-2), Some(KeyTtl::Missing));
        assert_eq!(KeyTtl::from_pttl(-1), Some(KeyTtl::Persistent));
        assert_eq!(KeyTtl::from_pttl(250), Some(KeyTtl::Expires(Duration::from_millis(250))));
        assert_eq!(KeyTtl::from_pttl(-7), None);
    }

    #[tokio::test]
    async fn increment_creates_persistent_counter() {
        let (store, _) = store();
        assert_eq!(store.ttl("k"), KeyTtl::Missing);
        let (total, ttl) = store.increment_with_ttl("k").await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(ttl, KeyTtl::Persistent);
        let (total, _) = store.increment_with_ttl("k").await.unwrap();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn counter_expires_and_restarts() {
        let (store, clock) = store();
        store.increment_with_ttl("k").await.unwrap();
        store.expire("k", Duration::from_millis(100)).await.unwrap();

        clock.advance(Duration::from_millis(40));
        let (total, ttl) = store.increment_with_ttl("k").await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(ttl, KeyTtl::Expires(Duration::from_millis(60)));

        clock.advance(Duration::from_millis(60));
        assert_eq!(store.counter_value("k"), None);
        let (total, ttl) = store.increment_with_ttl("k").await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(ttl, KeyTtl::Persistent);
    }

    #[tokio::test]
    async fn expire_on_missing_key_is_noop() {
        let (store, _) = store();
        store.expire("ghost", Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.ttl("ghost"), KeyTtl::Missing);
    }

    #[tokio::test]
    async fn record_event_prunes_strictly_below_cutoff() {
        let (store, _) = store();
        assert_eq!(store.record_event("z", "a", 100, 0).await.unwrap(), 1);
        assert_eq!(store.record_event("z", "b", 200, 0).await.unwrap(), 2);
        // Score 100 sits exactly on the cutoff and survives.
        assert_eq!(store.record_event("z", "c", 300, 100).await.unwrap(), 3);
        assert_eq!(store.record_event("z", "d", 400, 101).await.unwrap(), 3);
        assert_eq!(store.count_since("z", 300).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn duplicate_member_is_an_update_not_an_event() {
        let (store, _) = store();
        store.record_event("z", "same", 1, 0).await.unwrap();
        assert_eq!(store.record_event("z", "same", 2, 0).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mixing_shapes_is_wrong_type() {
        let (store, _) = store();
        store.increment_with_ttl("k").await.unwrap();
        let err = store.record_event("k", "m", 1, 0).await.unwrap_err();
        assert!(matches!(err, StoreError::WrongType { .. }));
        assert!(store.count_since("k", 0).await.is_err());

        store.record_event("z", "m", 1, 0).await.unwrap();
        assert!(store.increment_with_ttl("z").await.is_err());
    }

    #[tokio::test]
    async fn count_since_missing_key_is_zero() {
        let (store, _) = store();
        assert_eq!(store.count_since("nothing", 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn purge_drops_only_expired_keys() {
        let (store, clock) = store();
        store.increment_with_ttl("short").await.unwrap();
        store.expire("short", Duration::from_millis(10)).await.unwrap();
        store.increment_with_ttl("forever").await.unwrap();
        clock.advance(Duration::from_millis(10));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.counter_value("forever"), Some(1));
    }

    #[tokio::test]
    async fn purge_drops_fully_stale_event_sets() {
        let (store, _) = store();
        store.record_event("stale", "a", 100, 0).await.unwrap();
        store.record_event("mixed", "b", 100, 0).await.unwrap();
        store.record_event("mixed", "c", 900, 0).await.unwrap();
        store.increment_with_ttl("counter").await.unwrap();

        assert_eq!(store.purge_events_before(500), 1);
        assert_eq!(store.event_count("stale"), None);
        assert_eq!(store.event_count("mixed"), Some(1));
        assert_eq!(store.counter_value("counter"), Some(1));
    }
}
