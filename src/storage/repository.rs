use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::directory::{allocated_names, read_key, Directory};
use super::file_cache::FileCache;
use crate::actor::state::{fingerprint_value, validate_classpath};
use crate::actor::ActorState;
use crate::config::ActorCacheConfig;
use crate::error::{IoContext, Result};

/// Default bound on waiting for a `_LOCK`.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(15);

/// Maps actor states to cache directories under one root.
///
/// Create one per process and share it through
/// [`ActorContext`](crate::actor::ActorContext).
#[derive(Debug, Clone)]
pub struct CacheRepository {
    root: PathBuf,
    lock_timeout: Duration,
    directory: Directory,
}

/// One allocated cache directory, for inspection.
#[derive(Debug, Clone)]
pub struct CacheSlot {
    pub version: String,
    pub name: String,
    pub path: PathBuf,
    /// Parsed `_KEY`, `None` when missing or unreadable.
    pub key: Option<Value>,
}

impl CacheSlot {
    pub fn fingerprint(&self) -> Option<String> {
        self.key.as_ref().and_then(|k| fingerprint_value(k).ok())
    }
}

impl CacheRepository {
    /// Open the repository rooted at `root`, creating it when missing.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_lock_timeout(root, DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(root: impl Into<PathBuf>, lock_timeout: Duration) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).at_path(&root)?;

        Ok(Self {
            directory: Directory::new(root.clone(), lock_timeout),
            root,
            lock_timeout,
        })
    }

    pub fn from_config(config: &ActorCacheConfig) -> anyhow::Result<Self> {
        Ok(Self::with_lock_timeout(
            config.cache_dir(),
            config.lock_timeout()?,
        )?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Directory reserved for `state`: `<root>/<classpath>/<version>/<alloc>`.
    ///
    /// Equal states always get the same directory; states differing in any
    /// field get different ones.
    pub fn reserve_cache_dir(&self, state: &ActorState) -> Result<PathBuf> {
        let relpath = Path::new(state.classpath()).join(slugify(state.classversion()));
        let key = state.to_dict()?;

        let dir = self.directory.create_directory(&relpath, &key)?;
        debug!(
            classpath = state.classpath(),
            fingerprint = %fingerprint_value(&key)?,
            dir = %dir.display(),
            "Reserved cache directory"
        );
        Ok(dir)
    }

    /// Reserve the directory of `state` and open a file cache on it.
    pub fn file_cache(&self, state: &ActorState) -> Result<FileCache> {
        let dir = self.reserve_cache_dir(state)?;
        Ok(FileCache::new(dir, self.lock_timeout))
    }

    /// Allocated directories of `classpath`, across versions.
    pub fn list_slots(&self, classpath: &str) -> Result<Vec<CacheSlot>> {
        validate_classpath(classpath)?;
        let class_dir = self.root.join(classpath);

        let mut slots = Vec::new();
        for version in allocated_names(&class_dir)? {
            let version_dir = class_dir.join(&version);
            for name in allocated_names(&version_dir)? {
                let path = version_dir.join(&name);
                slots.push(CacheSlot {
                    key: read_key(&path),
                    version: version.clone(),
                    name,
                    path,
                });
            }
        }
        Ok(slots)
    }
}

/// Turn a version marker into a single, filesystem-safe path component.
///
/// Lowercases, drops apostrophes and joins the remaining ASCII alphanumeric
/// runs with `_`, so `1.2.0` becomes `1_2_0` and `v1-beta` becomes `v1_beta`.
pub fn slugify(version: &str) -> String {
    let lowered: String = version
        .to_lowercase()
        .chars()
        .filter(|&c| c != '\'')
        .collect();
    let slug = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    if slug.is_empty() {
        "_".to_string()
    } else {
        slug
    }
}
