use crate::{ttl_seconds, unavailable};
use async_trait::async_trait;
use chatgate::jobs::store::{decode_job, encode_job, job_key};
use chatgate::jobs::{Job, JobStore};
use chatgate::StoreError;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::warn;

/// [`JobStore`] keeping each job as a JSON string under `chat_job:<id>`.
#[derive(Clone)]
pub struct RedisJobStore {
    conn: MultiplexedConnection,
}

impl std::fmt::Debug for RedisJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisJobStore").finish_non_exhaustive()
    }
}

impl RedisJobStore {
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
impl JobStore for RedisJobStore {
    async fn put(&self, job: &Job, ttl: Duration) -> Result<(), StoreError> {
        let json = encode_job(job)?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(job_key(&job.id), json, ttl_seconds(ttl))
            .await
            .map_err(|e| unavailable("SETEX", e))?;
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> =
            conn.get(job_key(job_id)).await.map_err(|e| unavailable("GET", e))?;
        match raw {
            Some(json) => decode_job(&json).map(Some).map_err(|err| {
                warn!(target: "chatgate::redis", job_id, error = %err, "stored job is not valid JSON");
                err
            }),
            None => Ok(None),
        }
    }

    async fn delete(&self, job_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(job_key(job_id)).await.map_err(|e| unavailable("DEL", e))?;
        Ok(())
    }
}
