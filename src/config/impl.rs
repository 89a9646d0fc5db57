use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use tracing::warn;

use super::StaticConfig;

static CONFIG: OnceLock<ArcSwap<StaticConfig>> = OnceLock::new();

/// Get the global configuration instance
///
/// Returns an Arc pointer to the configuration, which is cheap to clone
/// and doesn't hold any locks.
pub fn get_config() -> Arc<StaticConfig> {
    CONFIG
        .get()
        .expect("Config not initialized. Call init_config() first.")
        .load_full()
}

/// Initialize the global configuration
///
/// Loads configuration from "config.toml" in the current directory.
/// If the file doesn't exist, uses in-memory defaults.
pub fn init_config() {
    CONFIG.get_or_init(|| ArcSwap::from_pointee(StaticConfig::load()));
}

/// Initialize the global configuration from an explicit value.
///
/// Intended for tests and embedders that construct the config themselves.
pub fn init_config_with(config: StaticConfig) {
    CONFIG.get_or_init(|| ArcSwap::from_pointee(config.clamped()));
}

impl StaticConfig {
    /// Load from `config.toml`, falling back to defaults when absent.
    pub fn load() -> Self {
        let config = match std::fs::read_to_string("config.toml") {
            Ok(content) => match toml::from_str::<StaticConfig>(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Failed to parse config.toml: {}, using defaults", e);
                    StaticConfig::default()
                }
            },
            Err(_) => StaticConfig::default(),
        };
        config.clamped()
    }
}
