//! URL creation and resolution pipelines
//!
//! `create_short` normalizes, de-duplicates, claims an identifier, persists
//! the mapping and back-fills the cache. `resolve` is the cache-first read
//! path with store fallback and cache repair. Both are gated by the rate
//! limiter before any durable I/O.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::cache::{RateLimiter, UrlCache};
use crate::config::StaticConfig;
use crate::errors::{LinkcutError, Result};
use crate::metrics_core::MetricsRecorder;
use crate::services::allocator::HashAllocator;
use crate::services::validation::{
    normalize_url, validate_normalized_url, validate_raw_url, validate_redirect_url,
};
use crate::storage::{with_retry_if, InsertOutcome, RetryPolicy, UrlStore};

/// Resolution result: the original URL and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUrl {
    pub url: String,
    pub from_cache: bool,
}

/// Creation and resolution over the two-tier identifier pipeline.
pub struct UrlService {
    allocator: Arc<HashAllocator>,
    url_store: Arc<dyn UrlStore>,
    url_cache: Arc<dyn UrlCache>,
    rate_limiter: Arc<dyn RateLimiter>,
    metrics: Arc<dyn MetricsRecorder>,
    config: Arc<StaticConfig>,
}

impl UrlService {
    pub fn new(
        allocator: Arc<HashAllocator>,
        url_store: Arc<dyn UrlStore>,
        url_cache: Arc<dyn UrlCache>,
        rate_limiter: Arc<dyn RateLimiter>,
        metrics: Arc<dyn MetricsRecorder>,
        config: Arc<StaticConfig>,
    ) -> Self {
        Self {
            allocator,
            url_store,
            url_cache,
            rate_limiter,
            metrics,
            config,
        }
    }

    /// Create (or deduplicate to) a short URL for `raw_url`.
    pub async fn create_short(&self, raw_url: &str, principal: Option<&str>) -> Result<String> {
        if self.config.rate_limit.gate_creation && !self.rate_limiter.try_consume(principal).await {
            warn!("rate limit exceeded for principal {:?}", principal);
            self.metrics.inc_rate_limit_exceeded();
            self.metrics.inc_url_creation_failure("rate_limited");
            return Err(LinkcutError::rate_limited(
                "Rate limit exceeded. Please try again later.",
            ));
        }

        self.metrics.inc_url_creation_total();
        let start = Instant::now();

        let result = self.create_short_inner(raw_url).await;

        self.metrics
            .observe_url_creation_duration(start.elapsed().as_secs_f64());

        match &result {
            Ok(short_url) => {
                self.metrics.inc_url_creation_success();
                info!("created short URL: {} for input: {}", short_url, raw_url);
            }
            Err(e) => {
                if matches!(e, LinkcutError::InvalidUrl(_)) {
                    self.metrics.inc_url_validation_failure("invalid_url");
                }
                self.metrics.inc_url_creation_failure(e.metric_kind());
            }
        }

        result
    }

    async fn create_short_inner(&self, raw_url: &str) -> Result<String> {
        validate_raw_url(&self.config.url_validation, raw_url)?;
        let normalized = normalize_url(&self.config.url_validation, raw_url)?;
        validate_normalized_url(&normalized)?;

        // Outer retry: only integrity violations that are not URL conflicts
        // get a fresh attempt. URL conflicts resolve inline below; a hash
        // collision is fatal for the attempt and propagates.
        let policy = RetryPolicy::from(self.config.retry);
        with_retry_if(
            "create_short_url",
            policy,
            |e| matches!(e, LinkcutError::Integrity(_)),
            || self.try_create(&normalized),
        )
        .await
    }

    async fn try_create(&self, normalized: &str) -> Result<String> {
        // Dedup, cheapest first: reverse cache, then reverse index.
        if let Some(hash) = self.url_cache.get_hash_by_url(normalized).await {
            debug!("found cached hash for URL: {}", normalized);
            self.metrics.inc_url_cache_hit();
            self.cache_mapping(&hash, normalized).await;
            return Ok(self.build_short_url(&hash));
        }

        if let Some(hash) = self.url_store.find_by_url(normalized).await? {
            info!("URL already exists in store, returning existing hash: {}", hash);
            self.cache_mapping(&hash, normalized).await;
            return Ok(self.build_short_url(&hash));
        }

        let hash = self.allocator.get_hash().await?;

        match self.url_store.insert(&hash, normalized).await {
            Ok(InsertOutcome::Inserted) => {
                self.cache_mapping(&hash, normalized).await;
                Ok(self.build_short_url(&hash))
            }
            Ok(InsertOutcome::UrlExists) => {
                self.metrics.inc_url_conflict("url");
                self.allocator.return_hash(&hash).await;

                match self.url_store.find_by_url(normalized).await? {
                    Some(existing) => {
                        info!(
                            "URL was created concurrently, returning existing hash: {}",
                            existing
                        );
                        self.cache_mapping(&existing, normalized).await;
                        Ok(self.build_short_url(&existing))
                    }
                    None => {
                        // The winner vanished between conflict and lookup.
                        Err(LinkcutError::integrity(
                            "url conflict raced with a delete, retrying",
                        ))
                    }
                }
            }
            Err(e) => {
                if matches!(e, LinkcutError::HashCollision(_)) {
                    self.metrics.inc_url_conflict("hash");
                }
                Err(e)
            }
        }
    }

    /// Resolve a hash back to its original URL.
    pub async fn resolve(&self, hash: &str, principal: Option<&str>) -> Result<ResolvedUrl> {
        if self.config.rate_limit.gate_redirect && !self.rate_limiter.try_consume(principal).await {
            self.metrics.inc_rate_limit_exceeded();
            return Err(LinkcutError::rate_limited(
                "Rate limit exceeded. Please try again later.",
            ));
        }

        self.metrics.inc_url_redirect_total();
        let start = Instant::now();

        let result = self.resolve_inner(hash).await;

        self.metrics
            .observe_url_redirect_duration(start.elapsed().as_secs_f64());

        match &result {
            Ok(resolved) => {
                self.metrics.inc_url_redirect_success();
                debug!(
                    "resolved {} -> {} (from_cache={})",
                    hash, resolved.url, resolved.from_cache
                );
            }
            Err(LinkcutError::NotFound(_)) => {
                self.metrics.inc_url_redirect_not_found();
            }
            Err(_) => {}
        }

        result
    }

    async fn resolve_inner(&self, hash: &str) -> Result<ResolvedUrl> {
        let resolved = if let Some(url) = self.url_cache.get_by_hash(hash).await {
            self.metrics.inc_url_cache_hit();
            ResolvedUrl {
                url,
                from_cache: true,
            }
        } else {
            self.metrics.inc_url_cache_miss();

            let url = self
                .url_store
                .find_by_hash(hash)
                .await?
                .ok_or_else(|| {
                    warn!("URL not found for hash: {}", hash);
                    LinkcutError::not_found(format!("URL not found for hash: {}", hash))
                })?;

            self.cache_mapping(hash, &url).await;
            ResolvedUrl {
                url,
                from_cache: false,
            }
        };

        // Open-redirect defense in depth, even for creation-validated rows.
        if let Err(rejection) =
            validate_redirect_url(&self.config.redirect_validation, &resolved.url)
        {
            self.metrics
                .inc_redirect_validation_failure(rejection.reason());
            return Err(rejection.into());
        }

        Ok(resolved)
    }

    /// Explicit release path for callers that abandoned a claimed hash.
    pub async fn return_hash(&self, hash: &str) {
        self.allocator.return_hash(hash).await;
    }

    async fn cache_mapping(&self, hash: &str, url: &str) {
        let ttl = self.config.url_cache.default_ttl_hours * 3600;
        self.url_cache.put(hash, url, ttl).await;
    }

    fn build_short_url(&self, hash: &str) -> String {
        format!("{}/{}", self.config.base_url_trimmed(), hash)
    }
}
