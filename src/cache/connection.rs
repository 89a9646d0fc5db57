use redis::aio::ConnectionManager;
use tracing::debug;

use crate::errors::{LinkcutError, Result};

/// 建立 Redis 连接
///
/// ConnectionManager 自动处理重连；clone 后即可在任意任务中使用。
pub async fn connect_redis(url: &str) -> Result<ConnectionManager> {
    debug!("Connecting to Redis at {}", url);

    let client = redis::Client::open(url)
        .map_err(|e| LinkcutError::cache_connection(format!("Failed to create Redis client: {e}")))?;

    let connection = ConnectionManager::new(client).await.map_err(|e| {
        LinkcutError::cache_connection(format!("Failed to create Redis ConnectionManager: {e}"))
    })?;

    debug!("Redis ConnectionManager established");
    Ok(connection)
}
