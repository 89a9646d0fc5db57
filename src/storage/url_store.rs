//! URL table
//!
//! Persistent `hash <-> url` mapping. `hash` is the primary key and `url`
//! carries a unique index, so every committed pair is unique in both
//! directions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use tracing::{debug, warn};

use crate::errors::{LinkcutError, Result};
use migration::entities::url;

/// Result of an insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The pair committed; this is the linearization point for the mapping.
    Inserted,
    /// Another mapping for the same URL already exists.
    UrlExists,
}

/// Persistent `hash <-> url` mapping.
#[async_trait]
pub trait UrlStore: Send + Sync {
    /// Insert a new pair.
    ///
    /// `UrlExists` on a URL-side conflict; `HashCollision` on a hash-side
    /// conflict; `Integrity` on any other constraint violation.
    async fn insert(&self, hash: &str, url: &str) -> Result<InsertOutcome>;

    async fn find_by_hash(&self, hash: &str) -> Result<Option<String>>;

    async fn find_by_url(&self, url: &str) -> Result<Option<String>>;

    /// Hashes of rows created before `cutoff`, oldest first, at most `limit`.
    async fn find_old_hashes(&self, cutoff: DateTime<Utc>, limit: u64) -> Result<Vec<String>>;

    /// Delete rows by hash. Missing hashes are ignored.
    async fn delete_by_hashes(&self, hashes: &[String]) -> Result<u64>;
}

/// Postgres-backed [`UrlStore`].
#[derive(Clone)]
pub struct SqlUrlStore {
    db: DatabaseConnection,
}

impl SqlUrlStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Map a unique-constraint violation to a typed conflict.
    ///
    /// Backends expose only the violated constraint's name inside the
    /// message, so inspection is unavoidable; it is confined to this one
    /// place and the creation pipeline double-checks URL conflicts with a
    /// follow-up read.
    fn classify_unique_violation(hash: &str, message: &str) -> LinkcutError {
        if message.contains("idx_url_url_unique") {
            LinkcutError::url_conflict(format!("url already mapped (hash candidate: {})", hash))
        } else if message.contains("pkey") || message.contains("pk_url") {
            LinkcutError::hash_collision(format!("hash already mapped: {}", hash))
        } else {
            LinkcutError::integrity(message.to_string())
        }
    }
}

#[async_trait]
impl UrlStore for SqlUrlStore {
    async fn insert(&self, hash: &str, url_value: &str) -> Result<InsertOutcome> {
        let model = url::ActiveModel {
            hash: Set(hash.to_string()),
            url: Set(url_value.to_string()),
            created_at: Set(Utc::now()),
        };

        match url::Entity::insert(model).exec(&self.db).await {
            Ok(_) => {
                debug!("saved url mapping: hash={}", hash);
                Ok(InsertOutcome::Inserted)
            }
            Err(e) => match e.sql_err() {
                Some(sea_orm::SqlErr::UniqueConstraintViolation(msg)) => {
                    match Self::classify_unique_violation(hash, &msg) {
                        LinkcutError::UrlConflict(_) => {
                            debug!("url already exists: {}", url_value);
                            Ok(InsertOutcome::UrlExists)
                        }
                        LinkcutError::HashCollision(m) => {
                            warn!("hash collision detected: {}", hash);
                            Err(LinkcutError::HashCollision(m))
                        }
                        other => Err(other),
                    }
                }
                Some(sea_orm::SqlErr::ForeignKeyConstraintViolation(msg)) => {
                    Err(LinkcutError::integrity(msg))
                }
                _ => Err(e.into()),
            },
        }
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<String>> {
        let row = url::Entity::find_by_id(hash).one(&self.db).await?;
        Ok(row.map(|m| m.url))
    }

    async fn find_by_url(&self, url_value: &str) -> Result<Option<String>> {
        let row = url::Entity::find()
            .filter(url::Column::Url.eq(url_value))
            .one(&self.db)
            .await?;
        Ok(row.map(|m| m.hash))
    }

    async fn find_old_hashes(&self, cutoff: DateTime<Utc>, limit: u64) -> Result<Vec<String>> {
        let rows: Vec<String> = url::Entity::find()
            .select_only()
            .column(url::Column::Hash)
            .filter(url::Column::CreatedAt.lt(cutoff))
            .order_by_asc(url::Column::CreatedAt)
            .limit(limit)
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn delete_by_hashes(&self, hashes: &[String]) -> Result<u64> {
        if hashes.is_empty() {
            return Ok(0);
        }

        let result = url::Entity::delete_many()
            .filter(url::Column::Hash.is_in(hashes.iter().cloned()))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
