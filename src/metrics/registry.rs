//! Global metrics registry
//!
//! Defines all Prometheus metrics used by the allocation and serving core.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

use crate::metrics_core::MetricsRecorder;

/// Global metrics instance (initialized explicitly via `init_metrics()`)
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the global metrics registry.
///
/// Returns `Ok(())` if metrics were successfully created and registered,
/// or if they were already initialized. Returns `Err` on Prometheus errors.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if METRICS.get().is_some() {
        return Ok(());
    }
    let metrics = Metrics::try_new()?;
    // Another thread may have initialized between our check and here; that's fine.
    let _ = METRICS.set(metrics);
    Ok(())
}

/// Get a reference to the global metrics, if initialized.
pub fn get_metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

/// Application metrics container
pub struct Metrics {
    /// Internal Prometheus registry
    registry: Registry,

    // ===== Hash 池指标 =====
    pub hash_pool_size: Gauge,
    pub hash_cache_hits_total: Counter,
    pub hash_cache_misses_total: Counter,
    pub hash_cache_fallback_total: Counter,
    pub hash_cache_returns_total: Counter,

    // ===== Hash 生成指标 =====
    pub hash_generation_total: Counter,
    pub hash_generation_success_total: Counter,
    pub hash_generation_errors_total: CounterVec,
    pub hash_generation_on_the_fly_total: Counter,
    pub hash_generation_duration_seconds: Histogram,

    // ===== URL 创建指标 =====
    pub url_creation_total: Counter,
    pub url_creation_success_total: Counter,
    pub url_creation_failures_total: CounterVec,
    pub url_creation_duration_seconds: Histogram,

    // ===== 重定向指标 =====
    pub url_redirect_total: Counter,
    pub url_redirect_success_total: Counter,
    pub url_redirect_not_found_total: Counter,
    pub url_redirect_duration_seconds: Histogram,

    // ===== URL 缓存指标 =====
    pub url_cache_hits_total: Counter,
    pub url_cache_misses_total: Counter,

    // ===== 冲突与校验指标 =====
    pub url_conflicts_total: CounterVec,
    pub url_validation_failures_total: CounterVec,
    pub redirect_validation_failures_total: CounterVec,

    // ===== 限流指标 =====
    pub rate_limit_exceeded_total: Counter,
}

impl Metrics {
    fn try_new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let hash_pool_size = Gauge::new(
            "linkcut_hash_pool_size",
            "Number of pre-generated hashes in the shared pool",
        )?;

        let hash_cache_hits_total = Counter::new(
            "linkcut_hash_cache_hits_total",
            "Hashes served directly from the pool",
        )?;

        let hash_cache_misses_total = Counter::new(
            "linkcut_hash_cache_misses_total",
            "Pool pops that found the pool empty",
        )?;

        let hash_cache_fallback_total = Counter::new(
            "linkcut_hash_cache_fallback_total",
            "Fallback claims served by the durable store",
        )?;

        let hash_cache_returns_total = Counter::new(
            "linkcut_hash_cache_returns_total",
            "Hashes pushed back into the pool",
        )?;

        let hash_generation_total = Counter::new(
            "linkcut_hash_generation_total",
            "Hash generation batch attempts",
        )?;

        let hash_generation_success_total = Counter::new(
            "linkcut_hash_generation_success_total",
            "Hashes generated and persisted",
        )?;

        let hash_generation_errors_total = CounterVec::new(
            Opts::new(
                "linkcut_hash_generation_errors_total",
                "Hash generation failures by error kind",
            ),
            &["kind"],
        )?;

        let hash_generation_on_the_fly_total = Counter::new(
            "linkcut_hash_generation_on_the_fly_total",
            "Last-resort hashes generated inside a request",
        )?;

        let hash_generation_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "linkcut_hash_generation_duration_seconds",
                "Hash generation batch latency in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;

        let url_creation_total =
            Counter::new("linkcut_url_creation_total", "Short URL creation requests")?;

        let url_creation_success_total = Counter::new(
            "linkcut_url_creation_success_total",
            "Short URL creations that committed or deduplicated",
        )?;

        let url_creation_failures_total = CounterVec::new(
            Opts::new(
                "linkcut_url_creation_failures_total",
                "Short URL creation failures by reason",
            ),
            &["reason"],
        )?;

        let url_creation_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "linkcut_url_creation_duration_seconds",
                "Short URL creation latency in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5]),
        )?;

        let url_redirect_total =
            Counter::new("linkcut_url_redirect_total", "Hash resolution requests")?;

        let url_redirect_success_total = Counter::new(
            "linkcut_url_redirect_success_total",
            "Hash resolutions that returned a URL",
        )?;

        let url_redirect_not_found_total = Counter::new(
            "linkcut_url_redirect_not_found_total",
            "Hash resolutions for unknown hashes",
        )?;

        let url_redirect_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "linkcut_url_redirect_duration_seconds",
                "Hash resolution latency in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;

        let url_cache_hits_total =
            Counter::new("linkcut_url_cache_hits_total", "URL cache hits")?;

        let url_cache_misses_total =
            Counter::new("linkcut_url_cache_misses_total", "URL cache misses")?;

        let url_conflicts_total = CounterVec::new(
            Opts::new(
                "linkcut_url_conflicts_total",
                "Insert conflicts by kind (url, hash)",
            ),
            &["kind"],
        )?;

        let url_validation_failures_total = CounterVec::new(
            Opts::new(
                "linkcut_url_validation_failures_total",
                "Creation-time validation failures by reason",
            ),
            &["reason"],
        )?;

        let redirect_validation_failures_total = CounterVec::new(
            Opts::new(
                "linkcut_redirect_validation_failures_total",
                "Redirect-time validation failures by reason",
            ),
            &["reason"],
        )?;

        let rate_limit_exceeded_total = Counter::new(
            "linkcut_rate_limit_exceeded_total",
            "Requests rejected by the rate limiter",
        )?;

        // Register all metrics
        macro_rules! register {
            ($registry:expr, $metric:ident) => {
                $registry.register(Box::new($metric.clone()))?;
            };
        }
        register!(registry, hash_pool_size);
        register!(registry, hash_cache_hits_total);
        register!(registry, hash_cache_misses_total);
        register!(registry, hash_cache_fallback_total);
        register!(registry, hash_cache_returns_total);
        register!(registry, hash_generation_total);
        register!(registry, hash_generation_success_total);
        register!(registry, hash_generation_errors_total);
        register!(registry, hash_generation_on_the_fly_total);
        register!(registry, hash_generation_duration_seconds);
        register!(registry, url_creation_total);
        register!(registry, url_creation_success_total);
        register!(registry, url_creation_failures_total);
        register!(registry, url_creation_duration_seconds);
        register!(registry, url_redirect_total);
        register!(registry, url_redirect_success_total);
        register!(registry, url_redirect_not_found_total);
        register!(registry, url_redirect_duration_seconds);
        register!(registry, url_cache_hits_total);
        register!(registry, url_cache_misses_total);
        register!(registry, url_conflicts_total);
        register!(registry, url_validation_failures_total);
        register!(registry, redirect_validation_failures_total);
        register!(registry, rate_limit_exceeded_total);

        Ok(Self {
            registry,
            hash_pool_size,
            hash_cache_hits_total,
            hash_cache_misses_total,
            hash_cache_fallback_total,
            hash_cache_returns_total,
            hash_generation_total,
            hash_generation_success_total,
            hash_generation_errors_total,
            hash_generation_on_the_fly_total,
            hash_generation_duration_seconds,
            url_creation_total,
            url_creation_success_total,
            url_creation_failures_total,
            url_creation_duration_seconds,
            url_redirect_total,
            url_redirect_success_total,
            url_redirect_not_found_total,
            url_redirect_duration_seconds,
            url_cache_hits_total,
            url_cache_misses_total,
            url_conflicts_total,
            url_validation_failures_total,
            redirect_validation_failures_total,
            rate_limit_exceeded_total,
        })
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| format!("Failed to encode metrics: {}", e))?;
        String::from_utf8(buffer).map_err(|e| format!("Metrics output is not valid UTF-8: {}", e))
    }
}

impl MetricsRecorder for Metrics {
    fn set_hash_pool_size(&self, size: f64) {
        self.hash_pool_size.set(size);
    }

    fn inc_hash_cache_hit(&self) {
        self.hash_cache_hits_total.inc();
    }

    fn inc_hash_cache_miss(&self) {
        self.hash_cache_misses_total.inc();
    }

    fn inc_hash_cache_fallback(&self) {
        self.hash_cache_fallback_total.inc();
    }

    fn inc_hash_cache_return(&self) {
        self.hash_cache_returns_total.inc();
    }

    fn inc_hash_generation_total(&self) {
        self.hash_generation_total.inc();
    }

    fn inc_hash_generation_success(&self, batch: u64) {
        self.hash_generation_success_total.inc_by(batch as f64);
    }

    fn inc_hash_generation_error(&self, kind: &str) {
        self.hash_generation_errors_total
            .with_label_values(&[kind])
            .inc();
    }

    fn inc_hash_generation_on_the_fly(&self) {
        self.hash_generation_on_the_fly_total.inc();
    }

    fn observe_hash_generation_duration(&self, duration_secs: f64) {
        self.hash_generation_duration_seconds.observe(duration_secs);
    }

    fn inc_url_creation_total(&self) {
        self.url_creation_total.inc();
    }

    fn inc_url_creation_success(&self) {
        self.url_creation_success_total.inc();
    }

    fn inc_url_creation_failure(&self, reason: &str) {
        self.url_creation_failures_total
            .with_label_values(&[reason])
            .inc();
    }

    fn observe_url_creation_duration(&self, duration_secs: f64) {
        self.url_creation_duration_seconds.observe(duration_secs);
    }

    fn inc_url_redirect_total(&self) {
        self.url_redirect_total.inc();
    }

    fn inc_url_redirect_success(&self) {
        self.url_redirect_success_total.inc();
    }

    fn inc_url_redirect_not_found(&self) {
        self.url_redirect_not_found_total.inc();
    }

    fn observe_url_redirect_duration(&self, duration_secs: f64) {
        self.url_redirect_duration_seconds.observe(duration_secs);
    }

    fn inc_url_cache_hit(&self) {
        self.url_cache_hits_total.inc();
    }

    fn inc_url_cache_miss(&self) {
        self.url_cache_misses_total.inc();
    }

    fn inc_url_conflict(&self, kind: &str) {
        self.url_conflicts_total.with_label_values(&[kind]).inc();
    }

    fn inc_url_validation_failure(&self, reason: &str) {
        self.url_validation_failures_total
            .with_label_values(&[reason])
            .inc();
    }

    fn inc_redirect_validation_failure(&self, reason: &str) {
        self.redirect_validation_failures_total
            .with_label_values(&[reason])
            .inc();
    }

    fn inc_rate_limit_exceeded(&self) {
        self.rate_limit_exceeded_total.inc();
    }
}
