//! Application lifecycle
//!
//! Builds the object graph (stores, caches, services, schedulers) and
//! exposes the caller surface consumed by the transport layer.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::{
    connect_redis, DistributedLock, RedisHashPool, RedisLock, RedisRateLimiter, RedisUrlCache,
};
use crate::config::{get_config, StaticConfig};
use crate::errors::Result;
use crate::metrics::{init_metrics, PrometheusMetricsWrapper};
use crate::metrics_core::MetricsRecorder;
use crate::scheduler::{validate_cron, CleanerScheduler, RefillScheduler};
use crate::services::{GeneratorPool, HashAllocator, HashGenerator, UrlCleaner, UrlService};
use crate::storage::{connect_postgres, run_migrations, RetryPolicy, SqlHashStore, SqlUrlStore};
use crate::system::logging::init_logging;
use crate::system::shutdown::{spawn_signal_listener, ShutdownFlag};

/// The assembled core: caller surface plus handles to background work.
pub struct Application {
    pub url_service: Arc<UrlService>,
    pub allocator: Arc<HashAllocator>,
    pub shutdown: ShutdownFlag,
    scheduler_handles: Vec<JoinHandle<()>>,
    generator_pool: Arc<GeneratorPool>,
    _log_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

impl Application {
    /// Build everything from the global config, run migrations, warm the
    /// pool and start the schedulers. Owns the logging subscriber.
    pub async fn bootstrap() -> Result<Self> {
        let config = get_config();

        let logging = init_logging(&config);
        if let Some(warning) = &logging.warning {
            warn!("{}", warning);
        }

        validate_cron(&config.generator.cron)?;
        validate_cron(&config.cleaner.cron)?;

        if let Err(e) = init_metrics() {
            warn!("metrics registry failed to initialize: {}", e);
        }
        let metrics: Arc<dyn MetricsRecorder> = Arc::new(PrometheusMetricsWrapper);

        // Durable store
        let db = connect_postgres(&config.database.url).await?;
        run_migrations(&db).await?;
        let hash_store = Arc::new(SqlHashStore::new(db.clone()));
        let url_store = Arc::new(SqlUrlStore::new(db));

        // Shared cache
        let redis = connect_redis(&config.redis.url).await?;
        let retry = RetryPolicy::from(config.retry);
        let pool = Arc::new(RedisHashPool::new(
            redis.clone(),
            config.hash_pool.pool_key.clone(),
            retry,
        ));
        let url_cache = Arc::new(RedisUrlCache::new(
            redis.clone(),
            retry,
            config.url_cache.default_ttl_hours,
        ));
        let rate_limiter = Arc::new(RedisRateLimiter::new(
            redis.clone(),
            config.rate_limit.clone(),
        ));
        let lock: Arc<dyn DistributedLock> = Arc::new(RedisLock::new(redis));

        let mut app = Self::assemble(
            config,
            hash_store,
            url_store,
            pool,
            url_cache,
            rate_limiter,
            lock,
            metrics,
        )
        .await?;
        app._log_guard = Some(logging.guard);
        Ok(app)
    }

    /// Wire services over already-constructed backends.
    #[allow(clippy::too_many_arguments)]
    pub async fn assemble(
        config: Arc<StaticConfig>,
        hash_store: Arc<dyn crate::storage::HashStore>,
        url_store: Arc<dyn crate::storage::UrlStore>,
        pool: Arc<dyn crate::cache::HashPool>,
        url_cache: Arc<dyn crate::cache::UrlCache>,
        rate_limiter: Arc<dyn crate::cache::RateLimiter>,
        lock: Arc<dyn DistributedLock>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Result<Self> {
        let retry = RetryPolicy::from(config.retry);
        let shutdown = ShutdownFlag::new();
        spawn_signal_listener(shutdown.clone());

        let generator = Arc::new(HashGenerator::new(
            Arc::clone(&hash_store),
            Arc::clone(&metrics),
            config.generator.batch_size,
            retry,
        ));
        let generator_pool = Arc::new(GeneratorPool::new(
            Arc::clone(&generator),
            config.generator.worker_size,
            config.generator.queue_capacity,
        ));

        let allocator = Arc::new(HashAllocator::new(
            Arc::clone(&pool),
            Arc::clone(&hash_store),
            Arc::clone(&metrics),
            config.hash_pool.fallback_max_concurrent,
            retry,
        ));

        let url_service = Arc::new(UrlService::new(
            Arc::clone(&allocator),
            Arc::clone(&url_store),
            Arc::clone(&url_cache),
            Arc::clone(&rate_limiter),
            Arc::clone(&metrics),
            Arc::clone(&config),
        ));

        let cleaner = Arc::new(UrlCleaner::new(
            Arc::clone(&url_store),
            Arc::clone(&hash_store),
            shutdown.clone(),
            config.cleaner.clone(),
        ));

        let refill_scheduler = Arc::new(RefillScheduler::new(
            Arc::clone(&pool),
            Arc::clone(&hash_store),
            Arc::clone(&generator_pool),
            Arc::clone(&lock),
            Arc::clone(&metrics),
            config.hash_pool.clone(),
            config.generator.clone(),
            retry,
        ));
        refill_scheduler.warm_up().await;

        let cleaner_scheduler = Arc::new(CleanerScheduler::new(
            cleaner,
            Arc::clone(&lock),
            config.cleaner.clone(),
        ));

        let scheduler_handles = vec![
            Arc::clone(&refill_scheduler).start(shutdown.clone()),
            cleaner_scheduler.start(shutdown.clone()),
        ];

        info!("linkcut core assembled");
        Ok(Self {
            url_service,
            allocator,
            shutdown,
            scheduler_handles,
            generator_pool,
            _log_guard: None,
        })
    }

    /// Trigger shutdown and wait for background work to wind down.
    pub async fn shutdown(self) {
        self.shutdown.trigger();
        for handle in self.scheduler_handles {
            handle.abort();
            let _ = handle.await;
        }
        match Arc::try_unwrap(self.generator_pool) {
            Ok(generator_pool) => generator_pool.shutdown().await,
            Err(_) => warn!("generator pool still referenced at shutdown, abandoning queue"),
        }
        info!("linkcut core stopped");
    }
}
