//! Age-based URL cleanup
//!
//! Deletes URL rows past retention in batches and makes their hashes
//! available again. The per-batch work is a two-step saga: release the
//! hashes first, delete the rows second, so a reader never observes a URL
//! row whose hash is missing from the hash table. A shutdown between the
//! steps compensates by removing the just-released hashes.

use std::sync::Arc;

use chrono::{Months, Utc};
use tracing::{debug, error, info, warn};

use crate::config::CleanerConfig;
use crate::errors::Result;
use crate::storage::{with_retry_if, HashStore, RetryPolicy, UrlStore};
use crate::system::shutdown::ShutdownFlag;

/// Batch cleanup runner.
pub struct UrlCleaner {
    url_store: Arc<dyn UrlStore>,
    hash_store: Arc<dyn HashStore>,
    shutdown: ShutdownFlag,
    config: CleanerConfig,
}

impl UrlCleaner {
    pub fn new(
        url_store: Arc<dyn UrlStore>,
        hash_store: Arc<dyn HashStore>,
        shutdown: ShutdownFlag,
        config: CleanerConfig,
    ) -> Self {
        Self {
            url_store,
            hash_store,
            shutdown,
            config,
        }
    }

    /// Delete URLs older than the retention window, batch by batch.
    ///
    /// Returns the number of URLs processed. A batch that keeps failing
    /// after its retry budget terminates the run with that error.
    pub async fn clean_old_urls(&self) -> Result<u64> {
        let cutoff = Utc::now()
            .checked_sub_months(Months::new(self.config.retention_years * 12))
            .unwrap_or_else(Utc::now);
        info!("starting cleanup of URLs older than {}", cutoff);

        let mut total_processed = 0u64;

        while !self.shutdown.is_set() {
            let batch = self
                .url_store
                .find_old_hashes(cutoff, self.config.batch_size)
                .await?;

            if batch.is_empty() {
                info!("no more old URLs found to clean");
                break;
            }

            info!(
                "processing batch of {} URLs (total processed: {})",
                batch.len(),
                total_processed
            );

            if self.shutdown.is_set() {
                warn!("shutdown in progress, stopping before processing batch");
                break;
            }

            let processed = match self.process_batch_with_retry(&batch).await {
                Ok(processed) => processed,
                Err(e) => {
                    error!("failed to process batch after retries, stopping cleanup: {}", e);
                    return Err(e);
                }
            };
            total_processed += processed;

            if processed == 0 {
                // Shutdown interrupted the batch mid-saga.
                warn!(
                    "shutdown in progress, stopping at {} processed URLs",
                    total_processed
                );
                break;
            }
        }

        info!("cleanup stopped (gracefully): {} URLs processed", total_processed);
        Ok(total_processed)
    }

    async fn process_batch_with_retry(&self, hashes: &[String]) -> Result<u64> {
        let policy = RetryPolicy::from(self.config.retry);
        // The saga steps are idempotent upserts/deletes; any failure kind
        // gets the full budget.
        with_retry_if("clean_url_batch", policy, |_| true, || {
            self.process_batch(hashes)
        })
        .await
    }

    /// One saga execution: release, then delete, compensating on shutdown.
    async fn process_batch(&self, hashes: &[String]) -> Result<u64> {
        if self.shutdown.is_set() {
            warn!("shutdown detected during batch processing, aborting");
            return Ok(0);
        }

        debug!("saga release step: {} hashes back to available", hashes.len());
        self.hash_store.release_available(hashes).await?;

        if self.shutdown.is_set() {
            warn!("shutdown detected after releasing hashes, compensating");
            self.compensate_release(hashes).await;
            return Ok(0);
        }

        debug!("saga delete step: {} old URLs", hashes.len());
        self.url_store.delete_by_hashes(hashes).await?;

        debug!("successfully processed batch of {} URLs", hashes.len());
        Ok(hashes.len() as u64)
    }

    /// Undo a release whose delete step will never run.
    async fn compensate_release(&self, hashes: &[String]) {
        warn!("compensating: removing {} hashes from hash table", hashes.len());
        match self.hash_store.delete(hashes).await {
            Ok(()) => info!("compensation completed: removed {} hashes", hashes.len()),
            Err(e) => error!("compensation failed: could not remove hashes: {}", e),
        }
    }
}
