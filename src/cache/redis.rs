//! Redis-backed [`CacheStore`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::{AsyncCommands, Client, RedisError, RedisResult, aio::ConnectionManager};
use tracing::{debug, instrument};

use super::entry;
use super::store::{CacheStore, StoreError};

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        StoreError::unavailable(err.to_string())
    }
}

/// Store over a multiplexed, auto-reconnecting Redis connection.
///
/// Each command is bounded by `operation_timeout`; an elapsed timeout is
/// reported as [`StoreError::Unavailable`].
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    operation_timeout: Duration,
}

impl RedisStore {
    #[instrument(skip_all)]
    pub async fn connect(url: &str, operation_timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = tokio::time::timeout(operation_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                StoreError::unavailable(format!(
                    "connecting timed out after {}ms",
                    operation_timeout.as_millis()
                ))
            })??;

        let store = Self {
            conn,
            operation_timeout,
        };
        store.ping().await?;
        debug!("connected to redis");
        Ok(store)
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = RedisResult<T>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::unavailable(format!(
                "{op} timed out after {}ms",
                self.operation_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<Vec<u8>> = self
            .bounded("GET", conn.get::<_, Option<Vec<u8>>>(key))
            .await?;
        match raw {
            Some(raw) => entry::decode(&raw),
            None => Err(StoreError::NotFound),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        if ttl.is_zero() {
            return Err(StoreError::InvalidTtl(ttl));
        }
        let payload = entry::encode(&value)?;
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);

        let mut conn = self.conn.clone();
        self.bounded("PSETEX", conn.pset_ex::<_, _, ()>(key, payload, millis))
            .await
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded("KEYS", conn.keys::<_, Vec<String>>(pattern))
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.bounded("DEL", conn.del::<_, ()>(key)).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.bounded("FLUSHDB", redis::cmd("FLUSHDB").query_async::<()>(&mut conn))
            .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let pong: String = self
            .bounded("PING", redis::cmd("PING").query_async::<String>(&mut conn))
            .await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StoreError::unavailable(format!(
                "unexpected PING reply `{pong}`"
            )))
        }
    }
}
