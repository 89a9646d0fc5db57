//! Background schedulers
//!
//! Periodic jobs driven by cron expressions, each guarded by a cluster-wide
//! named lock so only one process instance runs a tick at a time.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::{DistributedLock, HashPool};
use crate::config::{CleanerConfig, GeneratorConfig, HashPoolConfig};
use crate::errors::Result;
use crate::metrics_core::MetricsRecorder;
use crate::services::cleaner::UrlCleaner;
use crate::services::generator::GeneratorPool;
use crate::storage::{with_retry, HashStore, RetryPolicy};
use crate::system::shutdown::ShutdownFlag;

const REFILL_LOCK_NAME: &str = "generateHashBatch";
const CLEANER_LOCK_NAME: &str = "cleanOldUrls";

/// Warmup rounds run unconditionally at startup.
const WARMUP_ROUNDS: usize = 3;

/// Sleep until the next cron firing; `false` when the schedule is empty.
async fn sleep_until_next(schedule: &cron::Schedule) -> bool {
    let Some(next) = schedule.upcoming(Utc).next() else {
        return false;
    };
    let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    tokio::time::sleep(wait).await;
    true
}

/// Keeps the shared hash pool topped up to its target size.
pub struct RefillScheduler {
    pool: Arc<dyn HashPool>,
    hash_store: Arc<dyn HashStore>,
    generator_pool: Arc<GeneratorPool>,
    lock: Arc<dyn DistributedLock>,
    metrics: Arc<dyn MetricsRecorder>,
    pool_config: HashPoolConfig,
    generator_config: GeneratorConfig,
    retry: RetryPolicy,
}

impl RefillScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Arc<dyn HashPool>,
        hash_store: Arc<dyn HashStore>,
        generator_pool: Arc<GeneratorPool>,
        lock: Arc<dyn DistributedLock>,
        metrics: Arc<dyn MetricsRecorder>,
        pool_config: HashPoolConfig,
        generator_config: GeneratorConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            pool,
            hash_store,
            generator_pool,
            lock,
            metrics,
            pool_config,
            generator_config,
            retry,
        }
    }

    /// Unconditional startup warmup: generate and fill three times.
    pub async fn warm_up(&self) {
        info!("application ready - initializing hash pool");
        for _ in 0..WARMUP_ROUNDS {
            self.generator_pool.submit().await;
            self.fill_pool().await;
        }
        self.update_pool_gauge().await;
        info!("initial hash pool generation completed");
    }

    /// Spawn the periodic refill loop.
    pub fn start(self: Arc<Self>, shutdown: ShutdownFlag) -> JoinHandle<()> {
        let cron_expr = self.generator_config.cron.clone();
        tokio::spawn(async move {
            let schedule = match cron::Schedule::from_str(&cron_expr) {
                Ok(schedule) => schedule,
                Err(e) => {
                    error!("invalid generator cron '{}': {}", cron_expr, e);
                    return;
                }
            };

            while !shutdown.is_set() {
                if !sleep_until_next(&schedule).await {
                    break;
                }
                if shutdown.is_set() {
                    break;
                }
                self.tick().await;
            }
            debug!("refill scheduler stopped");
        })
    }

    async fn tick(&self) {
        let guard = match self
            .lock
            .try_acquire(
                REFILL_LOCK_NAME,
                Duration::from_secs(self.generator_config.lock_at_least_for_secs),
                Duration::from_secs(self.generator_config.lock_at_most_for_secs),
            )
            .await
        {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                debug!("refill tick skipped: lock held by another instance");
                return;
            }
            Err(e) => {
                warn!("refill tick skipped: lock backend error: {}", e);
                return;
            }
        };

        info!("scheduled job started (with lock): generating hash batch");
        self.generator_pool.submit().await;
        self.fill_pool().await;
        self.update_pool_gauge().await;

        if let Err(e) = self.lock.release(guard).await {
            warn!("failed to release refill lock: {}", e);
        }
    }

    /// Claim available hashes and push them until the pool reaches target.
    async fn fill_pool(&self) {
        loop {
            let current = match self.pool.size().await {
                Ok(size) => size,
                Err(e) => {
                    warn!("cannot read pool size, skipping refill: {}", e);
                    return;
                }
            };
            if current >= self.pool_config.max_size {
                debug!("hash pool is already full (size={})", current);
                return;
            }

            let needed = (self.pool_config.max_size - current)
                .min(self.generator_config.batch_size);

            let claimed = match with_retry("claim_for_refill", self.retry, || {
                self.hash_store.claim_available(needed)
            })
            .await
            {
                Ok(claimed) => claimed,
                Err(e) => {
                    warn!("refill claim failed: {}", e);
                    return;
                }
            };

            if claimed.is_empty() {
                debug!("no available hashes in store for pool refill");
                return;
            }

            info!("filling pool with {} claimed hashes", claimed.len());
            for (i, hash) in claimed.iter().enumerate() {
                if let Err(e) = self.pool.push_back(hash).await {
                    warn!("pool push failed mid-refill: {}", e);
                    // Claimed rows that never reached the pool go back to
                    // available; otherwise they leak as used-but-unpooled.
                    let rest: Vec<String> = claimed[i..].to_vec();
                    if let Err(e) = self.hash_store.release_available(&rest).await {
                        error!("failed to release {} unpooled hashes: {}", rest.len(), e);
                    }
                    return;
                }
            }
        }
    }

    async fn update_pool_gauge(&self) {
        if let Ok(size) = self.pool.size().await {
            self.metrics.set_hash_pool_size(size as f64);
        }
    }
}

/// Runs the URL cleaner on its cron schedule.
pub struct CleanerScheduler {
    cleaner: Arc<UrlCleaner>,
    lock: Arc<dyn DistributedLock>,
    config: CleanerConfig,
}

impl CleanerScheduler {
    pub fn new(cleaner: Arc<UrlCleaner>, lock: Arc<dyn DistributedLock>, config: CleanerConfig) -> Self {
        Self {
            cleaner,
            lock,
            config,
        }
    }

    /// Spawn the periodic cleanup loop.
    pub fn start(self: Arc<Self>, shutdown: ShutdownFlag) -> JoinHandle<()> {
        let cron_expr = self.config.cron.clone();
        tokio::spawn(async move {
            let schedule = match cron::Schedule::from_str(&cron_expr) {
                Ok(schedule) => schedule,
                Err(e) => {
                    error!("invalid cleaner cron '{}': {}", cron_expr, e);
                    return;
                }
            };

            while !shutdown.is_set() {
                if !sleep_until_next(&schedule).await {
                    break;
                }
                if shutdown.is_set() {
                    break;
                }
                self.tick().await;
            }
            debug!("cleaner scheduler stopped");
        })
    }

    async fn tick(&self) {
        let guard = match self
            .lock
            .try_acquire(
                CLEANER_LOCK_NAME,
                Duration::from_secs(self.config.lock_at_least_for_secs),
                Duration::from_secs(self.config.lock_at_most_for_secs),
            )
            .await
        {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                debug!("cleaner tick skipped: lock held by another instance");
                return;
            }
            Err(e) => {
                warn!("cleaner tick skipped: lock backend error: {}", e);
                return;
            }
        };

        info!("scheduled job started (with lock): cleaning old URLs");
        match self.cleaner.clean_old_urls().await {
            Ok(processed) => info!("scheduled cleanup completed: {} URLs", processed),
            Err(e) => error!("scheduled cleanup failed: {}", e),
        }

        if let Err(e) = self.lock.release(guard).await {
            warn!("failed to release cleaner lock: {}", e);
        }
    }
}

/// Fail fast on malformed cron expressions before spawning schedulers.
pub fn validate_cron(expr: &str) -> Result<()> {
    cron::Schedule::from_str(expr).map(|_| ()).map_err(|e| {
        crate::errors::LinkcutError::configuration(format!("invalid cron '{}': {}", expr, e))
    })
}
