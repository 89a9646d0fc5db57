//! Shared hash pool
//!
//! FIFO of pre-generated identifiers kept in the shared cache so every
//! process instance draws from the same pool. Single-element operations are
//! atomic at the cache; `size` is an estimate for metrics and refill
//! decisions only.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use crate::errors::Result;
use crate::storage::{with_retry, RetryPolicy};

/// Shared FIFO of pre-allocated identifiers.
#[async_trait]
pub trait HashPool: Send + Sync {
    /// Append a hash to the tail.
    async fn push_back(&self, hash: &str) -> Result<()>;

    /// Atomically remove and return the head, if any.
    async fn pop_front(&self) -> Result<Option<String>>;

    /// Approximate number of pooled hashes.
    async fn size(&self) -> Result<u64>;
}

/// Redis list-backed [`HashPool`] under a single well-known key.
pub struct RedisHashPool {
    connection: ConnectionManager,
    pool_key: String,
    retry: RetryPolicy,
}

impl RedisHashPool {
    pub fn new(connection: ConnectionManager, pool_key: String, retry: RetryPolicy) -> Self {
        debug!("hash pool backed by Redis list '{}'", pool_key);
        Self {
            connection,
            pool_key,
            retry,
        }
    }
}

#[async_trait]
impl HashPool for RedisHashPool {
    async fn push_back(&self, hash: &str) -> Result<()> {
        let conn = self.connection.clone();
        let key = self.pool_key.clone();
        let hash = hash.to_string();
        with_retry("pool_push_back", self.retry, || {
            let mut conn = conn.clone();
            let key = key.clone();
            let hash = hash.clone();
            async move {
                conn.rpush::<_, _, ()>(&key, &hash).await?;
                Ok(())
            }
        })
        .await
    }

    async fn pop_front(&self) -> Result<Option<String>> {
        let conn = self.connection.clone();
        let key = self.pool_key.clone();
        with_retry("pool_pop_front", self.retry, || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                let value: Option<String> = conn.lpop(&key, None).await?;
                Ok(value)
            }
        })
        .await
    }

    async fn size(&self) -> Result<u64> {
        let conn = self.connection.clone();
        let key = self.pool_key.clone();
        with_retry("pool_size", self.retry, || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                let len: u64 = conn.llen(&key).await?;
                Ok(len)
            }
        })
        .await
    }
}
