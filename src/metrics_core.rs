//! Core metrics traits (always compiled, no feature gate).
//!
//! Provides `MetricsRecorder` trait and `NoopMetrics` so that all modules
//! can accept `Arc<dyn MetricsRecorder>` unconditionally.  When Prometheus
//! is not wired in, `NoopMetrics` is injected and the compiler optimises
//! every call to a no-op.

use std::sync::Arc;

/// Trait for recording application metrics.
///
/// All methods are no-op by default, allowing partial implementation.
/// Implementations must be thread-safe (Send + Sync).
#[allow(unused_variables)]
pub trait MetricsRecorder: Send + Sync {
    // ===== Hash pool =====

    /// Set current hash pool size (gauge)
    fn set_hash_pool_size(&self, size: f64) {}

    /// Record a hash served straight from the pool
    fn inc_hash_cache_hit(&self) {}

    /// Record an empty pool pop
    fn inc_hash_cache_miss(&self) {}

    /// Record a fallback claim against the durable store
    fn inc_hash_cache_fallback(&self) {}

    /// Record a hash pushed back into the pool
    fn inc_hash_cache_return(&self) {}

    // ===== Hash generation =====

    /// Record a generation attempt
    fn inc_hash_generation_total(&self) {}

    /// Record generated hashes persisted in one batch
    fn inc_hash_generation_success(&self, batch: u64) {}

    /// Record a generation failure by error kind
    fn inc_hash_generation_error(&self, kind: &str) {}

    /// Record a last-resort on-the-fly generation
    fn inc_hash_generation_on_the_fly(&self) {}

    /// Observe one generation batch duration
    fn observe_hash_generation_duration(&self, duration_secs: f64) {}

    // ===== URL creation =====

    /// Record a creation request
    fn inc_url_creation_total(&self) {}

    /// Record a successful creation
    fn inc_url_creation_success(&self) {}

    /// Record a failed creation by reason
    fn inc_url_creation_failure(&self, reason: &str) {}

    /// Observe one creation duration
    fn observe_url_creation_duration(&self, duration_secs: f64) {}

    // ===== Redirect =====

    /// Record a resolution request
    fn inc_url_redirect_total(&self) {}

    /// Record a successful resolution
    fn inc_url_redirect_success(&self) {}

    /// Record a resolution for an unknown hash
    fn inc_url_redirect_not_found(&self) {}

    /// Observe one resolution duration
    fn observe_url_redirect_duration(&self, duration_secs: f64) {}

    // ===== URL cache =====

    /// Record a URL cache hit
    fn inc_url_cache_hit(&self) {}

    /// Record a URL cache miss
    fn inc_url_cache_miss(&self) {}

    // ===== Conflicts and validation =====

    /// Record an insert conflict ("url" or "hash")
    fn inc_url_conflict(&self, kind: &str) {}

    /// Record a creation-time validation failure
    fn inc_url_validation_failure(&self, reason: &str) {}

    /// Record a redirect-time validation failure
    fn inc_redirect_validation_failure(&self, reason: &str) {}

    // ===== Rate limiting =====

    /// Record a rejected request
    fn inc_rate_limit_exceeded(&self) {}
}

/// Noop metrics implementation for testing and unwired builds.
///
/// All methods do nothing, allowing code to run without Prometheus.
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {}

impl NoopMetrics {
    pub fn new() -> Self {
        Self
    }

    pub fn arc() -> Arc<dyn MetricsRecorder> {
        Arc::new(Self::new())
    }
}

impl Default for NoopMetrics {
    fn default() -> Self {
        Self::new()
    }
}
