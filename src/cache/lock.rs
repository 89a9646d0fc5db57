//! Distributed named locks
//!
//! Cluster-wide mutual exclusion for the background schedulers. A lock is
//! held for at least `lock_at_least_for` (even if the work finishes early)
//! and expires at `lock_at_most_for` so a crashed holder cannot wedge the
//! cluster.

use std::time::Duration;

use async_trait::async_trait;
use rand::distr::Alphanumeric;
use rand::Rng;
use redis::aio::ConnectionManager;
use redis::Script;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::Result;

/// Evidence of a held lock; pass back to [`DistributedLock::release`].
pub struct LockGuard {
    pub(crate) name: String,
    pub(crate) token: String,
    pub(crate) acquired_at: Instant,
    pub(crate) at_least_for: Duration,
}

impl LockGuard {
    pub fn new(name: impl Into<String>, token: impl Into<String>, at_least_for: Duration) -> Self {
        Self {
            name: name.into(),
            token: token.into(),
            acquired_at: Instant::now(),
            at_least_for,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Named cluster-wide lock with minimum and maximum hold.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try to take the named lock; `None` when another holder has it.
    async fn try_acquire(
        &self,
        name: &str,
        at_least_for: Duration,
        at_most_for: Duration,
    ) -> Result<Option<LockGuard>>;

    /// Release a held lock, honoring its minimum hold time.
    async fn release(&self, guard: LockGuard) -> Result<()>;
}

/// Redis `SET NX PX` lock with token-checked release.
pub struct RedisLock {
    connection: ConnectionManager,
    release_script: Script,
}

// Only the holder's token may shorten or delete the key.
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    local remaining = tonumber(ARGV[2])
    if remaining > 0 then
        return redis.call('PEXPIRE', KEYS[1], remaining)
    else
        return redis.call('DEL', KEYS[1])
    end
else
    return 0
end
"#;

impl RedisLock {
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            release_script: Script::new(RELEASE_SCRIPT),
        }
    }

    fn lock_key(name: &str) -> String {
        format!("lock:{}", name)
    }

    fn new_token() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect()
    }
}

#[async_trait]
impl DistributedLock for RedisLock {
    async fn try_acquire(
        &self,
        name: &str,
        at_least_for: Duration,
        at_most_for: Duration,
    ) -> Result<Option<LockGuard>> {
        let key = Self::lock_key(name);
        let token = Self::new_token();
        let mut conn = self.connection.clone();

        let acquired: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(at_most_for.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        if acquired.is_some() {
            debug!("acquired lock '{}'", name);
            Ok(Some(LockGuard {
                name: name.to_string(),
                token,
                acquired_at: Instant::now(),
                at_least_for,
            }))
        } else {
            debug!("lock '{}' is held elsewhere", name);
            Ok(None)
        }
    }

    async fn release(&self, guard: LockGuard) -> Result<()> {
        let key = Self::lock_key(&guard.name);
        let elapsed = guard.acquired_at.elapsed();
        let remaining = guard.at_least_for.saturating_sub(elapsed);
        let mut conn = self.connection.clone();

        let released: i64 = self
            .release_script
            .key(&key)
            .arg(&guard.token)
            .arg(remaining.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;

        if released == 0 {
            // 锁已过期或被他人持有
            warn!("lock '{}' was no longer held at release", guard.name);
        } else if remaining > Duration::ZERO {
            debug!(
                "lock '{}' kept for another {} ms (minimum hold)",
                guard.name,
                remaining.as_millis()
            );
        } else {
            debug!("released lock '{}'", guard.name);
        }

        Ok(())
    }
}
