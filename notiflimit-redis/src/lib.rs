//! Redis counter store for `notiflimit` (companion crate).
//! Bring your own `redis::aio::ConnectionManager`; the handle is cloned per call
//! and shared by every limiter built on top of it.
//!
//! Both critical sections run as `MULTI`/`EXEC` pipelines, so concurrent
//! checks from any number of processes observe each other atomically.

use async_trait::async_trait;
use notiflimit::{CounterStore, KeyTtl, StoreError};
use redis::aio::ConnectionManager;
use std::time::Duration;

const INCR_PTTL: &str = "MULTI INCR/PTTL";
const PEXPIRE: &str = "PEXPIRE";
const PRUNE_ADD_COUNT: &str = "MULTI ZREMRANGEBYSCORE/ZADD/ZCOUNT";
const ZCOUNT: &str = "ZCOUNT";

#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("connection", &"<redis::aio::ConnectionManager>")
            .finish()
    }
}

impl RedisCounterStore {
    /// Use an existing connection manager.
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Open `url`, build a connection manager and verify it with `PING`.
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url).map_err(|e| {
            tracing::warn!(target: "notiflimit::redis", url, error = %e, "invalid redis url");
            e
        })?;
        let mut connection = ConnectionManager::new(client).await.map_err(|e| {
            tracing::warn!(
                target: "notiflimit::redis",
                url,
                error = %e,
                "failed to connect to redis"
            );
            e
        })?;
        let _: String = redis::cmd("PING").query_async(&mut connection).await?;
        tracing::debug!(target: "notiflimit::redis", url, "connected to redis counter store");
        Ok(Self { connection })
    }

    fn conn(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_with_ttl(&self, key: &str) -> Result<(i64, KeyTtl), StoreError> {
        let mut conn = self.conn();
        let (total, pttl): (i64, i64) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::command(INCR_PTTL, key, e))?;

        let ttl = KeyTtl::from_pttl(pttl).ok_or_else(|| StoreError::UnexpectedReply {
            command: "PTTL",
            key: key.to_string(),
            detail: format!("reply {pttl}"),
        })?;
        Ok((total, ttl))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::command(PEXPIRE, key, e))?;
        Ok(())
    }

    async fn record_event(
        &self,
        key: &str,
        member: &str,
        score_ms: u64,
        prune_below_ms: u64,
    ) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        // "(" makes the bound exclusive: only scores strictly below are removed.
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(format!("({prune_below_ms}"))
            .ignore()
            .cmd("ZADD")
            .arg(key)
            .arg(score_ms)
            .arg(member)
            .ignore()
            .cmd("ZCOUNT")
            .arg(key)
            .arg("-inf")
            .arg("+inf")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::command(PRUNE_ADD_COUNT, key, e))?;
        Ok(count)
    }

    async fn count_since(&self, key: &str, min_score_ms: u64) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        let count: u64 = redis::cmd("ZCOUNT")
            .arg(key)
            .arg(min_score_ms)
            .arg("+inf")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::command(ZCOUNT, key, e))?;
        Ok(count)
    }
}
