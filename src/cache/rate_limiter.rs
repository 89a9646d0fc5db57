//! Distributed token-bucket rate limiter
//!
//! One bucket per principal, stored in the shared cache so concurrent
//! consumers on every process instance draw from the same budget. The
//! bucket state is read-modify-written inside a Lua script, which is the
//! atomicity boundary.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;

const USER_KEY_PREFIX: &str = "rate-limit:user:";
const ANONYMOUS_KEY: &str = "rate-limit:anonymous";

/// Per-principal admission control.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Try to consume one token for the principal.
    ///
    /// `true` admits the request. Backend failures admit as well: the
    /// limiter is advisory infrastructure and must never fail a request on
    /// its own outage.
    async fn try_consume(&self, principal: Option<&str>) -> bool;
}

/// Redis-backed [`RateLimiter`].
///
/// Refill is interval-based: every whole `refill_duration_seconds` elapsed
/// adds `refill_tokens`, capped at `capacity`. Idle buckets expire after
/// `bucket_expiration_minutes`.
pub struct RedisRateLimiter {
    connection: ConnectionManager,
    config: RateLimitConfig,
    script: Script,
}

// Bucket state lives in a hash {tokens, ts}; server time (TIME) avoids
// cross-instance clock skew.
const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill_tokens = tonumber(ARGV[2])
local refill_interval_ms = tonumber(ARGV[3])
local expire_ms = tonumber(ARGV[4])

local time = redis.call('TIME')
local now_ms = time[1] * 1000 + math.floor(time[2] / 1000)

local state = redis.call('HMGET', key, 'tokens', 'ts')
local tokens = tonumber(state[1])
local ts = tonumber(state[2])

if tokens == nil or ts == nil then
    tokens = capacity
    ts = now_ms
else
    local elapsed = now_ms - ts
    if elapsed >= refill_interval_ms then
        local intervals = math.floor(elapsed / refill_interval_ms)
        tokens = math.min(capacity, tokens + intervals * refill_tokens)
        ts = ts + intervals * refill_interval_ms
    end
end

local allowed = 0
if tokens > 0 then
    tokens = tokens - 1
    allowed = 1
end

redis.call('HSET', key, 'tokens', tokens, 'ts', ts)
redis.call('PEXPIRE', key, expire_ms)
return allowed
"#;

impl RedisRateLimiter {
    pub fn new(connection: ConnectionManager, config: RateLimitConfig) -> Self {
        debug!(
            "rate limiter: capacity={}, refill={}/{}s, bucket ttl={}m",
            config.capacity,
            config.refill_tokens,
            config.refill_duration_seconds,
            config.bucket_expiration_minutes
        );
        Self {
            connection,
            config,
            script: Script::new(TOKEN_BUCKET_SCRIPT),
        }
    }

    fn bucket_key(principal: Option<&str>) -> String {
        match principal {
            Some(id) if !id.is_empty() => format!("{}{}", USER_KEY_PREFIX, id),
            _ => ANONYMOUS_KEY.to_string(),
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn try_consume(&self, principal: Option<&str>) -> bool {
        if !self.config.enabled {
            return true;
        }

        let key = Self::bucket_key(principal);
        let mut conn = self.connection.clone();

        let result: redis::RedisResult<i64> = self
            .script
            .key(&key)
            .arg(self.config.capacity)
            .arg(self.config.refill_tokens)
            .arg(self.config.refill_duration_seconds * 1000)
            .arg(self.config.bucket_expiration_minutes * 60 * 1000)
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok(allowed) => allowed == 1,
            Err(e) => {
                // 限流器故障不应拒绝请求
                warn!("rate limiter backend error for {}: {}, admitting", key, e);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_key_for_user() {
        assert_eq!(
            RedisRateLimiter::bucket_key(Some("42")),
            "rate-limit:user:42"
        );
    }

    #[test]
    fn test_bucket_key_for_anonymous() {
        assert_eq!(RedisRateLimiter::bucket_key(None), "rate-limit:anonymous");
        assert_eq!(
            RedisRateLimiter::bucket_key(Some("")),
            "rate-limit:anonymous"
        );
    }
}
