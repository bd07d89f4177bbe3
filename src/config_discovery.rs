use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::ActorCacheConfig;

/// Project-level configuration file name
pub const CONFIG_FILE_NAME: &str = "actorcache.toml";

/// Discovers configuration by traversing up the directory tree
///
/// Falls back to `~/.config/actorcache/config.toml`.
pub fn discover_config(start_dir: &Path) -> Option<PathBuf> {
    let mut current = Some(start_dir);

    while let Some(dir) = current {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }
        current = dir.parent();
    }

    let global_config = dirs::home_dir()?.join(".config/actorcache/config.toml");
    global_config.exists().then_some(global_config)
}

/// Loads configuration with auto-discovery support
///
/// If `explicit_path` is provided, loads config from that path.
/// Otherwise, auto-discovers config by traversing up the directory tree from
/// the current directory. Without any file the defaults are used.
/// Environment overrides are applied last.
pub fn load_config_with_discovery(explicit_path: Option<&Path>) -> Result<ActorCacheConfig> {
    let path = match explicit_path {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let current_dir = std::env::current_dir()
                .context("Failed to get current directory for config discovery")?;
            discover_config(&current_dir)
        }
    };

    let mut config = match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading configuration");
            ActorCacheConfig::from_file(&path)?
        }
        None => ActorCacheConfig::default(),
    };

    config.apply_env_overrides();
    Ok(config)
}
