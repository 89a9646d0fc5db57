mod connection;
pub mod hash_pool;
pub mod lock;
pub mod rate_limiter;
pub mod url_cache;

pub use connection::connect_redis;
pub use hash_pool::{HashPool, RedisHashPool};
pub use lock::{DistributedLock, LockGuard, RedisLock};
pub use rate_limiter::{RateLimiter, RedisRateLimiter};
pub use url_cache::{RedisUrlCache, UrlCache};
