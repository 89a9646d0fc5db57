use serde::{Deserialize, Serialize};
use tracing::warn;

/// 应用程序配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub hash_pool: HashPoolConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub url_validation: UrlValidationConfig,
    #[serde(default)]
    pub redirect_validation: RedirectValidationConfig,
    #[serde(default)]
    pub url_cache: UrlCacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cleaner: CleanerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_database_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Redis 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

/// Retry executor parameters (fixed attempts, fixed delay).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

/// Pre-generated identifier pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashPoolConfig {
    #[serde(default = "default_pool_max_size")]
    pub max_size: u64,
    #[serde(default = "default_fallback_max_concurrent")]
    pub fallback_max_concurrent: usize,
    #[serde(default = "default_pool_key")]
    pub pool_key: String,
}

/// Batch hash generation and its worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_generator_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_generator_worker_size")]
    pub worker_size: usize,
    #[serde(default = "default_generator_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_generator_cron")]
    pub cron: String,
    #[serde(default = "default_generator_lock_at_most_for")]
    pub lock_at_most_for_secs: u64,
    #[serde(default = "default_generator_lock_at_least_for")]
    pub lock_at_least_for_secs: u64,
}

/// Creation-time URL validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlValidationConfig {
    #[serde(default = "default_url_max_length")]
    pub max_length: usize,
    #[serde(default = "default_forbidden_schemes")]
    pub forbidden_schemes: Vec<String>,
}

/// Redirect-time URL validation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RedirectValidationConfig {
    #[serde(default)]
    pub blacklisted_domains: Vec<String>,
}

/// Two-direction URL cache.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UrlCacheConfig {
    #[serde(default = "default_cache_ttl_hours")]
    pub default_ttl_hours: u64,
}

/// Token-bucket rate limiting, keyed by principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_capacity")]
    pub capacity: u64,
    #[serde(default = "default_rate_limit_refill_tokens")]
    pub refill_tokens: u64,
    #[serde(default = "default_rate_limit_refill_duration")]
    pub refill_duration_seconds: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bucket_expiration_minutes")]
    pub bucket_expiration_minutes: u64,
    #[serde(default = "default_true")]
    pub gate_creation: bool,
    #[serde(default)]
    pub gate_redirect: bool,
}

/// Age-based URL cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanerConfig {
    #[serde(default = "default_retention_years")]
    pub retention_years: u32,
    #[serde(default = "default_cleaner_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_cleaner_cron")]
    pub cron: String,
    #[serde(default = "default_cleaner_lock_at_most_for")]
    pub lock_at_most_for_secs: u64,
    #[serde(default = "default_cleaner_lock_at_least_for")]
    pub lock_at_least_for_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_true")]
    pub enable_rotation: bool,
}

// Default value functions
fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_database_url() -> String {
    "postgres://localhost/linkcut".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_database_connect_timeout() -> u64 {
    8
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_pool_max_size() -> u64 {
    1000
}

fn default_fallback_max_concurrent() -> usize {
    5
}

fn default_pool_key() -> String {
    "hash:pool".to_string()
}

fn default_generator_batch_size() -> u64 {
    100
}

fn default_generator_worker_size() -> usize {
    4
}

fn default_generator_queue_capacity() -> usize {
    10000
}

fn default_generator_cron() -> String {
    // 每分钟
    "0 * * * * *".to_string()
}

fn default_generator_lock_at_most_for() -> u64 {
    300
}

fn default_generator_lock_at_least_for() -> u64 {
    30
}

fn default_url_max_length() -> usize {
    2048
}

fn default_forbidden_schemes() -> Vec<String> {
    ["javascript", "data", "file", "about", "vbscript", "mailto", "tel"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_cache_ttl_hours() -> u64 {
    24
}

fn default_rate_limit_capacity() -> u64 {
    10
}

fn default_rate_limit_refill_tokens() -> u64 {
    10
}

fn default_rate_limit_refill_duration() -> u64 {
    60
}

fn default_bucket_expiration_minutes() -> u64 {
    10
}

fn default_retention_years() -> u32 {
    1
}

fn default_cleaner_batch_size() -> u64 {
    1000
}

fn default_cleaner_cron() -> String {
    // 每天 03:00
    "0 0 3 * * *".to_string()
}

fn default_cleaner_lock_at_most_for() -> u64 {
    3600
}

fn default_cleaner_lock_at_least_for() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            retry: RetryConfig::default(),
            hash_pool: HashPoolConfig::default(),
            generator: GeneratorConfig::default(),
            url_validation: UrlValidationConfig::default(),
            redirect_validation: RedirectValidationConfig::default(),
            url_cache: UrlCacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cleaner: CleanerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_size: default_database_pool_size(),
            connect_timeout_secs: default_database_connect_timeout(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for HashPoolConfig {
    fn default() -> Self {
        Self {
            max_size: default_pool_max_size(),
            fallback_max_concurrent: default_fallback_max_concurrent(),
            pool_key: default_pool_key(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            batch_size: default_generator_batch_size(),
            worker_size: default_generator_worker_size(),
            queue_capacity: default_generator_queue_capacity(),
            cron: default_generator_cron(),
            lock_at_most_for_secs: default_generator_lock_at_most_for(),
            lock_at_least_for_secs: default_generator_lock_at_least_for(),
        }
    }
}

impl Default for UrlValidationConfig {
    fn default() -> Self {
        Self {
            max_length: default_url_max_length(),
            forbidden_schemes: default_forbidden_schemes(),
        }
    }
}

impl Default for UrlCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_hours: default_cache_ttl_hours(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_rate_limit_capacity(),
            refill_tokens: default_rate_limit_refill_tokens(),
            refill_duration_seconds: default_rate_limit_refill_duration(),
            enabled: true,
            bucket_expiration_minutes: default_bucket_expiration_minutes(),
            gate_creation: true,
            gate_redirect: false,
        }
    }
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            retention_years: default_retention_years(),
            batch_size: default_cleaner_batch_size(),
            cron: default_cleaner_cron(),
            lock_at_most_for_secs: default_cleaner_lock_at_most_for(),
            lock_at_least_for_secs: default_cleaner_lock_at_least_for(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: true,
        }
    }
}

/// Clamp a value into its documented bounds, warning when it moves.
fn clamp_with_warning<T: PartialOrd + Copy + std::fmt::Display>(
    name: &str,
    value: T,
    min: T,
    max: T,
) -> T {
    if value < min {
        warn!("config {} = {} below minimum {}, clamping", name, value, min);
        min
    } else if value > max {
        warn!("config {} = {} above maximum {}, clamping", name, value, max);
        max
    } else {
        value
    }
}

impl StaticConfig {
    /// Enforce the documented bounds for every numeric option.
    pub fn clamped(mut self) -> Self {
        self.retry.max_attempts =
            clamp_with_warning("retry.max_attempts", self.retry.max_attempts, 1, 10);
        self.retry.delay_ms = clamp_with_warning("retry.delay_ms", self.retry.delay_ms, 100, 60000);

        self.generator.batch_size =
            clamp_with_warning("generator.batch_size", self.generator.batch_size, 1, 1000);
        self.generator.worker_size =
            clamp_with_warning("generator.worker_size", self.generator.worker_size, 1, 100);
        self.generator.queue_capacity = clamp_with_warning(
            "generator.queue_capacity",
            self.generator.queue_capacity,
            100,
            100000,
        );

        self.url_validation.max_length = clamp_with_warning(
            "url_validation.max_length",
            self.url_validation.max_length,
            100,
            10000,
        );

        self.cleaner.retry.max_attempts = clamp_with_warning(
            "cleaner.retry.max_attempts",
            self.cleaner.retry.max_attempts,
            1,
            10,
        );
        self.cleaner.retry.delay_ms =
            clamp_with_warning("cleaner.retry.delay_ms", self.cleaner.retry.delay_ms, 100, 60000);

        self.database.pool_size =
            clamp_with_warning("database.pool_size", self.database.pool_size, 1, 100);

        self
    }

    /// Short-URL prefix with any trailing slash removed.
    pub fn base_url_trimmed(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}
