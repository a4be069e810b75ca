use crate::{ttl_seconds, unavailable};
use async_trait::async_trait;
use chatgate::rate_limit::CounterStore;
use chatgate::StoreError;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::time::Duration;

/// [`CounterStore`] over Redis `INCR`, `EXPIRE`, `GET`, `SETEX` and `DEL`.
///
/// Limiter instances in every process that point at the same server share
/// their windows and buckets.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: MultiplexedConnection,
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore").finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|e| unavailable("open", e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| unavailable("connect", e))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1i64).await.map_err(|e| unavailable("INCR", e))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let secs = i64::try_from(ttl_seconds(ttl)).unwrap_or(i64::MAX);
        let _: () = conn.expire(key, secs).await.map_err(|e| unavailable("EXPIRE", e))?;
        Ok(())
    }

    async fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| unavailable("GET", e))
    }

    async fn set_int(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () =
            conn.set_ex(key, value, ttl_seconds(ttl)).await.map_err(|e| unavailable("SETEX", e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(|e| unavailable("DEL", e))?;
        Ok(())
    }
}
