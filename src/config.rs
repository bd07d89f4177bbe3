use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::LogFormat;
use crate::storage::default_cache_dir;

/// Environment variable overriding `cache.dir`
pub const CACHE_DIR_ENV: &str = "ACTORCACHE_CACHE_DIR";

/// Complete actorcache configuration (loaded from TOML file)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ActorCacheConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Cache root configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Cache root directory (defaults to the platform cache directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// How long to wait for a `_LOCK` before giving up (e.g. "15s", "500ms")
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            lock_timeout: default_lock_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: pretty, compact, json
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_lock_timeout() -> String {
    "15s".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl ActorCacheConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: ActorCacheConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Generate example configuration as TOML string
    pub fn example() -> Result<String> {
        let config = ActorCacheConfig {
            cache: CacheConfig {
                dir: Some("/data/actorcache".to_string()),
                lock_timeout: "30s".to_string(),
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "compact".to_string(),
            },
        };

        toml::to_string_pretty(&config).context("Failed to serialize example config")
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
            if !dir.is_empty() {
                self.cache.dir = Some(dir);
            }
        }
    }

    /// Resolved cache root
    pub fn cache_dir(&self) -> PathBuf {
        match &self.cache.dir {
            Some(dir) => PathBuf::from(dir),
            None => default_cache_dir(),
        }
    }

    /// Parsed `cache.lock_timeout`
    pub fn lock_timeout(&self) -> Result<Duration> {
        parse_duration(&self.cache.lock_timeout)
            .with_context(|| format!("Invalid cache.lock_timeout: {}", self.cache.lock_timeout))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(dir) = &self.cache.dir {
            if dir.trim().is_empty() {
                anyhow::bail!("cache.dir must not be empty when set");
            }
        }

        if self.lock_timeout()?.is_zero() {
            anyhow::bail!("cache.lock_timeout must be greater than zero");
        }

        let levels = ["trace", "debug", "info", "warn", "error"];
        if !levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!("logging.level must be one of: {}", levels.join(", "));
        }

        if LogFormat::parse(&self.logging.format).is_none() {
            anyhow::bail!("logging.format must be one of: pretty, compact, json");
        }

        Ok(())
    }
}

/// Parse a duration such as `500ms`, `15s`, `2m`, `1h` or `1d`
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(anyhow!("Empty duration string"));
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| anyhow!("Missing duration unit: {}. Use: ms, s, m, h, d", s))?;
    let (num_str, unit) = s.split_at(split);
    let num: u64 = num_str
        .parse()
        .map_err(|_| anyhow!("Invalid duration: {}", s))?;

    let duration = match unit {
        "ms" => Duration::from_millis(num),
        "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(num * 60),
        "h" => Duration::from_secs(num * 3600),
        "d" => Duration::from_secs(num * 86400),
        _ => return Err(anyhow!("Invalid duration unit: {}. Use: ms, s, m, h, d", unit)),
    };

    Ok(duration)
}
