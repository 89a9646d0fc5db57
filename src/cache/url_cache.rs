//! Two-direction URL cache
//!
//! Advisory cache over the shared store: `url:{hash}` maps forward,
//! `url_to_hash:{url}` maps back. The durable tables stay authoritative;
//! failures here are logged and swallowed, never surfaced to callers.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{trace, warn};

use crate::errors::Result;
use crate::storage::{with_retry, RetryPolicy};

const URL_CACHE_PREFIX: &str = "url:";
const REVERSE_CACHE_PREFIX: &str = "url_to_hash:";

/// Advisory `hash -> url` / `url -> hash` cache with TTL.
#[async_trait]
pub trait UrlCache: Send + Sync {
    /// Write both directions under one logical operation.
    ///
    /// Best-effort: a failed leg is logged, not propagated.
    async fn put(&self, hash: &str, url: &str, ttl_secs: u64);

    /// Forward lookup; a miss is indistinguishable from absence.
    async fn get_by_hash(&self, hash: &str) -> Option<String>;

    /// Reverse lookup; a miss is indistinguishable from absence.
    async fn get_hash_by_url(&self, url: &str) -> Option<String>;

    /// Remove both directions.
    async fn delete(&self, hash: &str);
}

/// Redis-backed [`UrlCache`].
pub struct RedisUrlCache {
    connection: ConnectionManager,
    retry: RetryPolicy,
    default_ttl_secs: u64,
}

impl RedisUrlCache {
    pub fn new(connection: ConnectionManager, retry: RetryPolicy, default_ttl_hours: u64) -> Self {
        Self {
            connection,
            retry,
            default_ttl_secs: default_ttl_hours * 3600,
        }
    }

    fn forward_key(hash: &str) -> String {
        format!("{}{}", URL_CACHE_PREFIX, hash)
    }

    fn reverse_key(url: &str) -> String {
        format!("{}{}", REVERSE_CACHE_PREFIX, url)
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let conn = self.connection.clone();
        let key = key.to_string();
        with_retry("cache_get", self.retry, || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                let value: Option<String> = conn.get(&key).await?;
                Ok(value)
            }
        })
        .await
    }
}

#[async_trait]
impl UrlCache for RedisUrlCache {
    async fn put(&self, hash: &str, url: &str, ttl_secs: u64) {
        let ttl = if ttl_secs == 0 {
            self.default_ttl_secs
        } else {
            ttl_secs
        };

        let forward = Self::forward_key(hash);
        let reverse = Self::reverse_key(url);
        let conn = self.connection.clone();
        let url_owned = url.to_string();
        let hash_owned = hash.to_string();

        let result = with_retry("cache_put", self.retry, || {
            let mut conn = conn.clone();
            let forward = forward.clone();
            let reverse = reverse.clone();
            let url = url_owned.clone();
            let hash = hash_owned.clone();
            async move {
                conn.set_ex::<_, _, ()>(&forward, &url, ttl).await?;
                conn.set_ex::<_, _, ()>(&reverse, &hash, ttl).await?;
                Ok(())
            }
        })
        .await;

        match result {
            Ok(()) => trace!("cached url mapping: hash={} (TTL: {}s)", hash, ttl),
            Err(e) => warn!("failed to cache url mapping for hash {}: {}", hash, e),
        }
    }

    async fn get_by_hash(&self, hash: &str) -> Option<String> {
        match self.get_value(&Self::forward_key(hash)).await {
            Ok(value) => value,
            Err(e) => {
                warn!("url cache get failed for hash {}: {}", hash, e);
                None
            }
        }
    }

    async fn get_hash_by_url(&self, url: &str) -> Option<String> {
        match self.get_value(&Self::reverse_key(url)).await {
            Ok(value) => value,
            Err(e) => {
                warn!("reverse cache get failed: {}", e);
                None
            }
        }
    }

    async fn delete(&self, hash: &str) {
        let forward = Self::forward_key(hash);
        let conn = self.connection.clone();

        // The reverse key needs the cached url; read it before deleting.
        let url = self.get_by_hash(hash).await;

        let result = with_retry("cache_delete", self.retry, || {
            let mut conn = conn.clone();
            let forward = forward.clone();
            let reverse = url.as_deref().map(Self::reverse_key);
            async move {
                conn.del::<_, ()>(&forward).await?;
                if let Some(reverse) = reverse {
                    conn.del::<_, ()>(&reverse).await?;
                }
                Ok(())
            }
        })
        .await;

        match result {
            Ok(()) => trace!("removed cached url mapping: hash={}", hash),
            Err(e) => warn!("failed to remove cached mapping for hash {}: {}", hash, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_key_scheme() {
        assert_eq!(RedisUrlCache::forward_key("abc"), "url:abc");
    }

    #[test]
    fn test_reverse_key_scheme() {
        assert_eq!(
            RedisUrlCache::reverse_key("https://example.com/a"),
            "url_to_hash:https://example.com/a"
        );
    }

    #[test]
    fn test_keys_do_not_collide_across_directions() {
        // A hash that happens to equal a URL must still map to a distinct key.
        let value = "x";
        assert_ne!(
            RedisUrlCache::forward_key(value),
            RedisUrlCache::reverse_key(value)
        );
    }
}
