//! MetricsRecorder trait re-exports and Prometheus wrapper.
//!
//! The core `MetricsRecorder` trait and `NoopMetrics` live in
//! `crate::metrics_core` (always compiled).  This module re-exports them
//! and adds the Prometheus-specific wrapper.

// Re-export from metrics_core so `use crate::metrics::*` keeps working.
pub use crate::metrics_core::{MetricsRecorder, NoopMetrics};

use super::registry::get_metrics;

/// Wrapper that delegates to the global metrics registry.
///
/// Services hold `Arc<dyn MetricsRecorder>`; this wrapper lets them record
/// into the `OnceLock` global without owning it. Calls made before
/// `init_metrics()` are silently dropped.
pub struct PrometheusMetricsWrapper;

macro_rules! delegate {
    ($method:ident $(, $arg:expr)*) => {
        if let Some(metrics) = get_metrics() {
            metrics.$method($($arg),*);
        }
    };
}

impl MetricsRecorder for PrometheusMetricsWrapper {
    fn set_hash_pool_size(&self, size: f64) {
        delegate!(set_hash_pool_size, size);
    }

    fn inc_hash_cache_hit(&self) {
        delegate!(inc_hash_cache_hit);
    }

    fn inc_hash_cache_miss(&self) {
        delegate!(inc_hash_cache_miss);
    }

    fn inc_hash_cache_fallback(&self) {
        delegate!(inc_hash_cache_fallback);
    }

    fn inc_hash_cache_return(&self) {
        delegate!(inc_hash_cache_return);
    }

    fn inc_hash_generation_total(&self) {
        delegate!(inc_hash_generation_total);
    }

    fn inc_hash_generation_success(&self, batch: u64) {
        delegate!(inc_hash_generation_success, batch);
    }

    fn inc_hash_generation_error(&self, kind: &str) {
        delegate!(inc_hash_generation_error, kind);
    }

    fn inc_hash_generation_on_the_fly(&self) {
        delegate!(inc_hash_generation_on_the_fly);
    }

    fn observe_hash_generation_duration(&self, duration_secs: f64) {
        delegate!(observe_hash_generation_duration, duration_secs);
    }

    fn inc_url_creation_total(&self) {
        delegate!(inc_url_creation_total);
    }

    fn inc_url_creation_success(&self) {
        delegate!(inc_url_creation_success);
    }

    fn inc_url_creation_failure(&self, reason: &str) {
        delegate!(inc_url_creation_failure, reason);
    }

    fn observe_url_creation_duration(&self, duration_secs: f64) {
        delegate!(observe_url_creation_duration, duration_secs);
    }

    fn inc_url_redirect_total(&self) {
        delegate!(inc_url_redirect_total);
    }

    fn inc_url_redirect_success(&self) {
        delegate!(inc_url_redirect_success);
    }

    fn inc_url_redirect_not_found(&self) {
        delegate!(inc_url_redirect_not_found);
    }

    fn observe_url_redirect_duration(&self, duration_secs: f64) {
        delegate!(observe_url_redirect_duration, duration_secs);
    }

    fn inc_url_cache_hit(&self) {
        delegate!(inc_url_cache_hit);
    }

    fn inc_url_cache_miss(&self) {
        delegate!(inc_url_cache_miss);
    }

    fn inc_url_conflict(&self, kind: &str) {
        delegate!(inc_url_conflict, kind);
    }

    fn inc_url_validation_failure(&self, reason: &str) {
        delegate!(inc_url_validation_failure, reason);
    }

    fn inc_redirect_validation_failure(&self, reason: &str) {
        delegate!(inc_redirect_validation_failure, reason);
    }

    fn inc_rate_limit_exceeded(&self) {
        delegate!(inc_rate_limit_exceeded);
    }
}
