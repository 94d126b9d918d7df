use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

use super::StaticConfig;
use crate::errors::Result;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

static CONFIG: OnceLock<ArcSwap<StaticConfig>> = OnceLock::new();

/// Get the global configuration instance
///
/// Returns an Arc pointer to the configuration, which is cheap to clone
/// and doesn't hold any locks. Falls back to defaults when `init_config`
/// was never called (tests, library use).
pub fn get_config() -> Arc<StaticConfig> {
    CONFIG
        .get_or_init(|| ArcSwap::from_pointee(StaticConfig::default()))
        .load_full()
}

/// Initialize the global configuration from "config.toml"
pub fn init_config() -> Result<()> {
    init_config_from(DEFAULT_CONFIG_PATH)
}

/// Initialize the global configuration from the given TOML path
///
/// A missing file is not an error; environment variables and defaults
/// still apply. Validation errors are returned to the caller.
pub fn init_config_from(path: &str) -> Result<()> {
    let loaded = StaticConfig::load(path)?;
    match CONFIG.get() {
        Some(existing) => existing.store(Arc::new(loaded)),
        None => {
            let _ = CONFIG.set(ArcSwap::from_pointee(loaded));
        }
    }
    Ok(())
}

/// Replace the global configuration (used by tests and the CLI)
pub fn set_config(config: StaticConfig) {
    CONFIG
        .get_or_init(|| ArcSwap::from_pointee(StaticConfig::default()))
        .store(Arc::new(config));
}
