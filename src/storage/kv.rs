use std::path::{Path, PathBuf};
use std::sync::Arc;

use rocksdb::{IteratorMode, Options, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{IoContext, Result};

/// Directory name of the key-value store inside a cache directory.
pub const KV_DIR: &str = "cache.db";

/// Key-value store living next to an actor's file entries.
///
/// Values are stored as JSON. RocksDB handles concurrent readers and writers
/// within one process; the handle is cheap to clone.
#[derive(Clone)]
pub struct KvCache {
    path: PathBuf,
    db: Arc<DB>,
}

impl KvCache {
    /// Open (or create) the store under `cache_dir`.
    pub fn open(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir).at_path(cache_dir)?;
        let path = cache_dir.join(KV_DIR);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);
        opts.set_statistics_level(rocksdb::statistics::StatsLevel::DisableAll);

        let db = DB::open(&opts, &path)?;
        debug!(path = %path.display(), "Opened key-value cache");

        Ok(Self {
            path,
            db: Arc::new(db),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db.put(key.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.db.get_pinned(key.as_bytes())?.is_some())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.db.delete(key.as_bytes())?;
        Ok(())
    }

    /// All keys, in byte order.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, _) = item?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }
}

impl std::fmt::Debug for KvCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvCache").field("path", &self.path).finish()
    }
}
