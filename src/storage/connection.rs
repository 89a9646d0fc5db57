use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::info;

use crate::errors::{LinkcutError, Result};
use migration::{Migrator, MigratorTrait};

/// 连接 PostgreSQL 数据库
///
/// claim_available 依赖 `FOR UPDATE SKIP LOCKED` 和序列，
/// 因此持久层只支持 Postgres。
pub async fn connect_postgres(database_url: &str) -> Result<DatabaseConnection> {
    if database_url.is_empty() {
        return Err(LinkcutError::database_config("DATABASE_URL 未设置"));
    }
    if !database_url.starts_with("postgres://") && !database_url.starts_with("postgresql://") {
        return Err(LinkcutError::database_config(format!(
            "不支持的数据库 URL: {}. 仅支持 postgres://",
            database_url
        )));
    }

    let config = crate::config::get_config();
    let pool_size = config.database.pool_size;
    let timeout = std::time::Duration::from_secs(config.database.connect_timeout_secs);

    let mut opt = ConnectOptions::new(database_url.to_owned());
    opt.max_connections(pool_size)
        .min_connections(pool_size.min(5))
        .connect_timeout(timeout)
        .acquire_timeout(timeout)
        .idle_timeout(std::time::Duration::from_secs(300))
        .max_lifetime(std::time::Duration::from_secs(3600))
        .sqlx_logging(false);

    Database::connect(opt).await.map_err(|e| {
        LinkcutError::database_connection(format!("无法连接到 PostgreSQL 数据库: {}", e))
    })
}

/// 运行数据库迁移
pub async fn run_migrations(db: &DatabaseConnection) -> Result<()> {
    Migrator::up(db, None)
        .await
        .map_err(|e| LinkcutError::database_operation(format!("迁移失败: {}", e)))?;

    info!("Database migrations completed");
    Ok(())
}
