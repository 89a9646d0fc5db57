//! Shared in-memory doubles for the storage and cache seams.
//!
//! Every double implements the corresponding production trait so services
//! can be assembled exactly as in `runtime`, minus the infrastructure.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use linkcut::cache::{DistributedLock, HashPool, LockGuard, RateLimiter, UrlCache};
use linkcut::config::{RateLimitConfig, StaticConfig};
use linkcut::errors::{LinkcutError, Result};
use linkcut::metrics_core::MetricsRecorder;
use linkcut::services::{HashAllocator, UrlService};
use linkcut::storage::{HashStore, InsertOutcome, RetryPolicy, UrlStore};
use linkcut::system::shutdown::ShutdownFlag;

// ===== HashStore double =====

#[derive(Default)]
pub struct MemoryHashStore {
    rows: Mutex<BTreeMap<String, bool>>,
    sequence: AtomicI64,
    /// Sequence values beyond this are unavailable (simulates exhaustion).
    sequence_limit: Mutex<Option<i64>>,
    /// When set, `release_available` trips this flag (mid-saga shutdown).
    trigger_shutdown_on_release: Mutex<Option<ShutdownFlag>>,
}

impl MemoryHashStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_available(&self, hashes: &[&str]) {
        let mut rows = self.rows.lock().unwrap();
        for h in hashes {
            rows.insert(h.to_string(), true);
        }
    }

    pub fn seed_used(&self, hashes: &[&str]) {
        let mut rows = self.rows.lock().unwrap();
        for h in hashes {
            rows.insert(h.to_string(), false);
        }
    }

    pub fn availability(&self, hash: &str) -> Option<bool> {
        self.rows.lock().unwrap().get(hash).copied()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn exhaust_sequence(&self) {
        *self.sequence_limit.lock().unwrap() = Some(self.sequence.load(Ordering::SeqCst));
    }

    pub fn shutdown_on_release(&self, flag: ShutdownFlag) {
        *self.trigger_shutdown_on_release.lock().unwrap() = Some(flag);
    }
}

#[async_trait]
impl HashStore for MemoryHashStore {
    async fn next_sequence(&self, n: u64) -> Result<Vec<i64>> {
        let limit = *self.sequence_limit.lock().unwrap();
        let mut numbers = Vec::new();
        for _ in 0..n {
            let next = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(limit) = limit {
                if next > limit {
                    break;
                }
            }
            numbers.push(next);
        }
        Ok(numbers)
    }

    async fn insert_if_absent(&self, hashes: &[String]) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        for h in hashes {
            rows.entry(h.clone()).or_insert(true);
        }
        Ok(())
    }

    async fn claim_available(&self, n: u64) -> Result<Vec<String>> {
        let mut rows = self.rows.lock().unwrap();
        let candidates: Vec<String> = rows
            .iter()
            .filter(|(_, &available)| available)
            .take(n as usize)
            .map(|(h, _)| h.clone())
            .collect();
        for h in &candidates {
            rows.insert(h.clone(), false);
        }
        Ok(candidates)
    }

    async fn mark_used(&self, hash: &str) -> Result<()> {
        self.rows.lock().unwrap().insert(hash.to_string(), false);
        Ok(())
    }

    async fn release_available(&self, hashes: &[String]) -> Result<()> {
        {
            let mut rows = self.rows.lock().unwrap();
            for h in hashes {
                rows.insert(h.clone(), true);
            }
        }
        if let Some(flag) = self.trigger_shutdown_on_release.lock().unwrap().as_ref() {
            flag.trigger();
        }
        Ok(())
    }

    async fn delete(&self, hashes: &[String]) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        for h in hashes {
            rows.remove(h);
        }
        Ok(())
    }
}

// ===== UrlStore double =====

#[derive(Default)]
pub struct MemoryUrlStore {
    rows: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
    /// Pending `Integrity` failures injected into `insert`.
    integrity_failures: AtomicU32,
    /// Pending failures injected into `delete_by_hashes`.
    delete_failures: AtomicU32,
    /// Pending `find_by_url` calls that report a miss despite the row
    /// existing (models a lookup racing an insert on another instance).
    suppressed_url_lookups: AtomicU32,
    insert_calls: AtomicU32,
}

impl MemoryUrlStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, hash: &str, url: &str) {
        self.seed_with_created_at(hash, url, Utc::now());
    }

    pub fn seed_with_created_at(&self, hash: &str, url: &str, created_at: DateTime<Utc>) {
        self.rows
            .lock()
            .unwrap()
            .insert(hash.to_string(), (url.to_string(), created_at));
    }

    pub fn fail_inserts_with_integrity(&self, times: u32) {
        self.integrity_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, times: u32) {
        self.delete_failures.store(times, Ordering::SeqCst);
    }

    pub fn suppress_url_lookups(&self, times: u32) {
        self.suppressed_url_lookups.store(times, Ordering::SeqCst);
    }

    pub fn contains_hash(&self, hash: &str) -> bool {
        self.rows.lock().unwrap().contains_key(hash)
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn insert_calls(&self) -> u32 {
        self.insert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UrlStore for MemoryUrlStore {
    async fn insert(&self, hash: &str, url: &str) -> Result<InsertOutcome> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);

        let pending = self.integrity_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.integrity_failures.store(pending - 1, Ordering::SeqCst);
            return Err(LinkcutError::integrity("injected integrity violation"));
        }

        let mut rows = self.rows.lock().unwrap();
        if rows.values().any(|(u, _)| u == url) {
            return Ok(InsertOutcome::UrlExists);
        }
        if rows.contains_key(hash) {
            return Err(LinkcutError::hash_collision(format!(
                "hash already mapped: {}",
                hash
            )));
        }
        rows.insert(hash.to_string(), (url.to_string(), Utc::now()));
        Ok(InsertOutcome::Inserted)
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<String>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(hash)
            .map(|(url, _)| url.clone()))
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<String>> {
        let suppressed = self.suppressed_url_lookups.load(Ordering::SeqCst);
        if suppressed > 0 {
            self.suppressed_url_lookups
                .store(suppressed - 1, Ordering::SeqCst);
            return Ok(None);
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|(_, (u, _))| u == url)
            .map(|(h, _)| h.clone()))
    }

    async fn find_old_hashes(&self, cutoff: DateTime<Utc>, limit: u64) -> Result<Vec<String>> {
        let rows = self.rows.lock().unwrap();
        let mut old: Vec<(String, DateTime<Utc>)> = rows
            .iter()
            .filter(|(_, (_, created))| *created < cutoff)
            .map(|(h, (_, created))| (h.clone(), *created))
            .collect();
        old.sort_by_key(|(_, created)| *created);
        Ok(old
            .into_iter()
            .take(limit as usize)
            .map(|(h, _)| h)
            .collect())
    }

    async fn delete_by_hashes(&self, hashes: &[String]) -> Result<u64> {
        let pending = self.delete_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.delete_failures.store(pending - 1, Ordering::SeqCst);
            return Err(LinkcutError::transient_backend("injected delete failure"));
        }

        let mut rows = self.rows.lock().unwrap();
        let mut deleted = 0;
        for h in hashes {
            if rows.remove(h).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

// ===== HashPool double =====

#[derive(Default)]
pub struct MemoryHashPool {
    entries: Mutex<VecDeque<String>>,
}

impl MemoryHashPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, hashes: &[&str]) {
        let mut entries = self.entries.lock().unwrap();
        for h in hashes {
            entries.push_back(h.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl HashPool for MemoryHashPool {
    async fn push_back(&self, hash: &str) -> Result<()> {
        self.entries.lock().unwrap().push_back(hash.to_string());
        Ok(())
    }

    async fn pop_front(&self) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().pop_front())
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.entries.lock().unwrap().len() as u64)
    }
}

// ===== UrlCache double =====

#[derive(Default)]
pub struct MemoryUrlCache {
    forward: Mutex<HashMap<String, String>>,
    reverse: Mutex<HashMap<String, String>>,
    /// When set, every operation silently does nothing (a dead cache).
    failing: AtomicBool,
    put_calls: AtomicU32,
}

impl MemoryUrlCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn put_calls(&self) -> u32 {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn cached_url(&self, hash: &str) -> Option<String> {
        self.forward.lock().unwrap().get(hash).cloned()
    }
}

#[async_trait]
impl UrlCache for MemoryUrlCache {
    async fn put(&self, hash: &str, url: &str, _ttl_secs: u64) {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return;
        }
        self.forward
            .lock()
            .unwrap()
            .insert(hash.to_string(), url.to_string());
        self.reverse
            .lock()
            .unwrap()
            .insert(url.to_string(), hash.to_string());
    }

    async fn get_by_hash(&self, hash: &str) -> Option<String> {
        if self.failing.load(Ordering::SeqCst) {
            return None;
        }
        self.forward.lock().unwrap().get(hash).cloned()
    }

    async fn get_hash_by_url(&self, url: &str) -> Option<String> {
        if self.failing.load(Ordering::SeqCst) {
            return None;
        }
        self.reverse.lock().unwrap().get(url).cloned()
    }

    async fn delete(&self, hash: &str) {
        if self.failing.load(Ordering::SeqCst) {
            return;
        }
        if let Some(url) = self.forward.lock().unwrap().remove(hash) {
            self.reverse.lock().unwrap().remove(&url);
        }
    }
}

// ===== RateLimiter doubles =====

/// Admits everything.
pub struct AllowAllLimiter;

#[async_trait]
impl RateLimiter for AllowAllLimiter {
    async fn try_consume(&self, _principal: Option<&str>) -> bool {
        true
    }
}

/// In-process token bucket with the same interval-refill math as the
/// shared-cache limiter; uses the tokio clock so tests can pause time.
pub struct MemoryRateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, (u64, Instant)>>,
}

impl MemoryRateLimiter {
    pub fn new(config: RateLimitConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn try_consume(&self, principal: Option<&str>) -> bool {
        if !self.config.enabled {
            return true;
        }

        let key = match principal {
            Some(id) if !id.is_empty() => format!("rate-limit:user:{}", id),
            _ => "rate-limit:anonymous".to_string(),
        };
        let interval = Duration::from_secs(self.config.refill_duration_seconds);
        let now = Instant::now();

        let mut buckets = self.buckets.lock().unwrap();
        let (tokens, ts) = buckets
            .entry(key)
            .or_insert((self.config.capacity, now));

        let elapsed = now.duration_since(*ts);
        if !interval.is_zero() && elapsed >= interval {
            let intervals = elapsed.as_millis() / interval.as_millis();
            *tokens = (*tokens + intervals as u64 * self.config.refill_tokens)
                .min(self.config.capacity);
            *ts += interval * intervals as u32;
        }

        if *tokens > 0 {
            *tokens -= 1;
            true
        } else {
            false
        }
    }
}

// ===== DistributedLock double =====

/// Grants every acquisition; remembers how many times each name was taken.
#[derive(Default)]
pub struct MemoryLock {
    acquisitions: Mutex<HashMap<String, u32>>,
}

impl MemoryLock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn acquisitions(&self, name: &str) -> u32 {
        self.acquisitions
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl DistributedLock for MemoryLock {
    async fn try_acquire(
        &self,
        name: &str,
        at_least_for: Duration,
        _at_most_for: Duration,
    ) -> Result<Option<LockGuard>> {
        *self
            .acquisitions
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert(0) += 1;
        Ok(Some(LockGuard::new(name, "test-token", at_least_for)))
    }

    async fn release(&self, _guard: LockGuard) -> Result<()> {
        Ok(())
    }
}

// ===== Recording metrics =====

/// Counts the few signals the scenarios assert on.
#[derive(Default)]
pub struct RecordingMetrics {
    pub on_the_fly: AtomicU64,
    pub rate_limit_exceeded: AtomicU64,
    pub url_conflicts: AtomicU64,
    pub hash_cache_fallback: AtomicU64,
    pub pool_size: Mutex<Option<f64>>,
}

impl RecordingMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl MetricsRecorder for RecordingMetrics {
    fn inc_hash_generation_on_the_fly(&self) {
        self.on_the_fly.fetch_add(1, Ordering::SeqCst);
    }

    fn inc_rate_limit_exceeded(&self) {
        self.rate_limit_exceeded.fetch_add(1, Ordering::SeqCst);
    }

    fn inc_url_conflict(&self, _kind: &str) {
        self.url_conflicts.fetch_add(1, Ordering::SeqCst);
    }

    fn inc_hash_cache_fallback(&self) {
        self.hash_cache_fallback.fetch_add(1, Ordering::SeqCst);
    }

    fn set_hash_pool_size(&self, size: f64) {
        *self.pool_size.lock().unwrap() = Some(size);
    }
}

// ===== Assembly =====

/// Everything a scenario needs, wired over the in-memory doubles.
pub struct TestCore {
    pub config: Arc<StaticConfig>,
    pub hash_store: Arc<MemoryHashStore>,
    pub url_store: Arc<MemoryUrlStore>,
    pub pool: Arc<MemoryHashPool>,
    pub cache: Arc<MemoryUrlCache>,
    pub metrics: Arc<RecordingMetrics>,
    pub allocator: Arc<HashAllocator>,
    pub service: Arc<UrlService>,
}

pub fn fast_retry_config() -> StaticConfig {
    let mut config = StaticConfig::default();
    config.retry.delay_ms = 100; // lower bound; keeps retry tests quick
    config
}

pub fn build_core(config: StaticConfig) -> TestCore {
    build_core_with_limiter(config, Arc::new(AllowAllLimiter))
}

pub fn build_core_with_limiter(
    config: StaticConfig,
    limiter: Arc<dyn RateLimiter>,
) -> TestCore {
    let config = Arc::new(config);
    let hash_store = MemoryHashStore::new();
    let url_store = MemoryUrlStore::new();
    let pool = MemoryHashPool::new();
    let cache = MemoryUrlCache::new();
    let metrics = RecordingMetrics::new();

    let retry = RetryPolicy::from(config.retry);
    let allocator = Arc::new(HashAllocator::new(
        pool.clone(),
        hash_store.clone(),
        metrics.clone(),
        config.hash_pool.fallback_max_concurrent,
        retry,
    ));

    let service = Arc::new(UrlService::new(
        allocator.clone(),
        url_store.clone(),
        cache.clone(),
        limiter,
        metrics.clone(),
        config.clone(),
    ));

    TestCore {
        config,
        hash_store,
        url_store,
        pool,
        cache,
        metrics,
        allocator,
        service,
    }
}
