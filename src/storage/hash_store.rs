//! Durable hash table
//!
//! One row per identifier ever minted. `available = true` means the hash
//! may be handed to a new URL; claiming flips it to `false` atomically.

use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, QueryFilter, Set,
    Statement,
};
use tracing::debug;

use crate::errors::{LinkcutError, Result};
use migration::entities::hash;

/// Persistent record of all identifiers ever issued.
#[async_trait]
pub trait HashStore: Send + Sync {
    /// Draw `n` strictly increasing, never-reused sequence values.
    async fn next_sequence(&self, n: u64) -> Result<Vec<i64>>;

    /// Insert each hash as available; duplicates are silently ignored.
    async fn insert_if_absent(&self, hashes: &[String]) -> Result<()>;

    /// Atomically flip up to `n` available rows to used and return them.
    ///
    /// Never returns the same row to two concurrent callers and never
    /// blocks on rows locked by another claimer.
    async fn claim_available(&self, n: u64) -> Result<Vec<String>>;

    /// Upsert a single hash as used. Only the on-the-fly fallback calls this.
    async fn mark_used(&self, hash: &str) -> Result<()>;

    /// Upsert each hash back to available; idempotent.
    async fn release_available(&self, hashes: &[String]) -> Result<()>;

    /// Remove rows outright. Only the cleaner's compensation calls this.
    async fn delete(&self, hashes: &[String]) -> Result<()>;
}

/// Postgres-backed [`HashStore`].
///
/// The claim and sequence paths are raw statements: sea-orm has no
/// `FOR UPDATE SKIP LOCKED` builder and `nextval` is backend-specific.
#[derive(Clone)]
pub struct SqlHashStore {
    db: DatabaseConnection,
}

impl SqlHashStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl HashStore for SqlHashStore {
    async fn next_sequence(&self, n: u64) -> Result<Vec<i64>> {
        let rows = self
            .db
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "SELECT nextval('unique_number_seq') AS seq FROM generate_series(1, $1)",
                [(n as i64).into()],
            ))
            .await?;

        let mut numbers = Vec::with_capacity(rows.len());
        for row in rows {
            let seq: i64 = row
                .try_get("", "seq")
                .map_err(|e| LinkcutError::database_operation(format!("读取序列值失败: {}", e)))?;
            numbers.push(seq);
        }
        Ok(numbers)
    }

    async fn insert_if_absent(&self, hashes: &[String]) -> Result<()> {
        if hashes.is_empty() {
            return Ok(());
        }

        let models: Vec<hash::ActiveModel> = hashes
            .iter()
            .map(|h| hash::ActiveModel {
                hash: Set(h.clone()),
                available: Set(Some(true)),
            })
            .collect();

        hash::Entity::insert_many(models)
            .on_conflict(
                OnConflict::column(hash::Column::Hash)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        debug!("inserted up to {} hashes as available", hashes.len());
        Ok(())
    }

    async fn claim_available(&self, n: u64) -> Result<Vec<String>> {
        // Legacy rows carry NULL availability and count as available.
        let rows = self
            .db
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "UPDATE hash SET available = false \
                 WHERE hash IN ( \
                     SELECT hash FROM hash \
                     WHERE available IS NULL OR available = true \
                     LIMIT $1 \
                     FOR UPDATE SKIP LOCKED \
                 ) \
                 RETURNING hash",
                [(n as i64).into()],
            ))
            .await?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            let h: String = row
                .try_get("", "hash")
                .map_err(|e| LinkcutError::database_operation(format!("读取 hash 失败: {}", e)))?;
            claimed.push(h);
        }
        Ok(claimed)
    }

    async fn mark_used(&self, h: &str) -> Result<()> {
        let model = hash::ActiveModel {
            hash: Set(h.to_string()),
            available: Set(Some(false)),
        };

        hash::Entity::insert(model)
            .on_conflict(
                OnConflict::column(hash::Column::Hash)
                    .update_column(hash::Column::Available)
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }

    async fn release_available(&self, hashes: &[String]) -> Result<()> {
        if hashes.is_empty() {
            return Ok(());
        }

        let models: Vec<hash::ActiveModel> = hashes
            .iter()
            .map(|h| hash::ActiveModel {
                hash: Set(h.clone()),
                available: Set(Some(true)),
            })
            .collect();

        hash::Entity::insert_many(models)
            .on_conflict(
                OnConflict::column(hash::Column::Hash)
                    .update_column(hash::Column::Available)
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        debug!("released {} hashes back to available", hashes.len());
        Ok(())
    }

    async fn delete(&self, hashes: &[String]) -> Result<()> {
        if hashes.is_empty() {
            return Ok(());
        }

        hash::Entity::delete_many()
            .filter(hash::Column::Hash.is_in(hashes.iter().cloned()))
            .exec(&self.db)
            .await?;

        Ok(())
    }
}
