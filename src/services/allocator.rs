//! Hash allocation
//!
//! Serves identifiers to the creation pipeline: pool first, then an atomic
//! claim against the durable store, then last-resort on-the-fly generation.
//! The store fallback runs under a bounded permit so an empty pool cannot
//! stampede the database.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::codec;
use crate::errors::{LinkcutError, Result};
use crate::metrics_core::MetricsRecorder;
use crate::storage::{with_retry, HashStore, RetryPolicy};
use crate::cache::HashPool;

/// Permit acquisition bound before the fallback fails fast.
const FALLBACK_PERMIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Hands out identifiers and takes returns.
pub struct HashAllocator {
    pool: Arc<dyn HashPool>,
    hash_store: Arc<dyn HashStore>,
    metrics: Arc<dyn MetricsRecorder>,
    fallback_semaphore: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl HashAllocator {
    pub fn new(
        pool: Arc<dyn HashPool>,
        hash_store: Arc<dyn HashStore>,
        metrics: Arc<dyn MetricsRecorder>,
        fallback_max_concurrent: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            pool,
            hash_store,
            metrics,
            fallback_semaphore: Arc::new(Semaphore::new(fallback_max_concurrent.max(1))),
            retry,
        }
    }

    /// Obtain a hash for a new URL.
    ///
    /// Pool errors degrade to a pool miss: the durable store stays the
    /// authority and a cache outage must not fail the request on its own.
    pub async fn get_hash(&self) -> Result<String> {
        match self.pool.pop_front().await {
            Ok(Some(hash)) => {
                self.metrics.inc_hash_cache_hit();
                debug!("retrieved hash from pool: {}", hash);
                return Ok(hash);
            }
            Ok(None) => {
                warn!("hash pool is empty, falling back to store");
            }
            Err(e) => {
                warn!("hash pool unavailable ({}), falling back to store", e);
            }
        }

        self.metrics.inc_hash_cache_miss();
        self.claim_from_store().await
    }

    /// Return an unused hash to the pool (conflict branch of creation).
    pub async fn return_hash(&self, hash: &str) {
        if hash.is_empty() {
            return;
        }
        match self.pool.push_back(hash).await {
            Ok(()) => {
                self.metrics.inc_hash_cache_return();
                debug!("returned hash to pool: {}", hash);
            }
            Err(e) => {
                // 哈希仍在 hash 表中标记为已用，不会丢失
                warn!("failed to return hash {} to pool: {}", hash, e);
            }
        }
    }

    /// Estimated pool size, for metrics and refill decisions.
    pub async fn pool_size(&self) -> u64 {
        self.pool.size().await.unwrap_or(0)
    }

    async fn claim_from_store(&self) -> Result<String> {
        self.metrics.inc_hash_cache_fallback();

        let permit = match timeout(
            FALLBACK_PERMIT_TIMEOUT,
            Arc::clone(&self.fallback_semaphore).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(LinkcutError::no_available_hash(
                    "fallback permit pool is closed",
                ));
            }
            Err(_) => {
                warn!("too many concurrent fallback requests, rejecting");
                return Err(LinkcutError::no_available_hash(
                    "too many concurrent fallback requests",
                ));
            }
        };

        let result = self.claim_or_generate().await;
        drop(permit);
        result
    }

    async fn claim_or_generate(&self) -> Result<String> {
        let claimed = with_retry("claim_available", self.retry, || {
            self.hash_store.claim_available(1)
        })
        .await?;

        if let Some(hash) = claimed.into_iter().next() {
            info!("claimed hash from store (fallback): {}", hash);
            return Ok(hash);
        }

        warn!("no available hashes in store, generating on-the-fly");
        self.metrics.inc_hash_generation_on_the_fly();
        self.generate_immediately().await
    }

    /// Last resort: draw one sequence value and mark it used directly.
    async fn generate_immediately(&self) -> Result<String> {
        let numbers = with_retry("next_sequence", self.retry, || {
            self.hash_store.next_sequence(1)
        })
        .await
        .map_err(|e| {
            LinkcutError::no_available_hash(format!("cannot draw sequence value: {}", e))
        })?;

        let number = numbers
            .first()
            .copied()
            .ok_or_else(|| LinkcutError::no_available_hash("sequence exhausted"))?;

        let hash = codec::encode(number as u64);

        with_retry("mark_used", self.retry, || self.hash_store.mark_used(&hash))
            .await
            .map_err(|e| {
                LinkcutError::no_available_hash(format!("cannot persist generated hash: {}", e))
            })?;

        warn!("generated hash on-the-fly (last resort): {}", hash);
        Ok(hash)
    }
}
