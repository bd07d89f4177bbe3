//! On-disk cache storage
//!
//! Layout under a cache root:
//!
//! ```text
//! <root>/<classpath>/<version>/_LOCK                    allocation lock
//! <root>/<classpath>/<version>/<alloc>/_KEY             canonical state JSON
//! <root>/<classpath>/<version>/<alloc>/_LOCK            write lock
//! <root>/<classpath>/<version>/<alloc>/<name>/_SUCCESS  commit marker
//! <root>/<classpath>/<version>/<alloc>/<name>/data<ext> payload
//! <root>/<classpath>/<version>/<alloc>/cache.db/        key-value store
//! ```

pub mod cache_dir;
pub mod directory;
pub mod file_cache;
pub mod kv;
pub mod lock;
pub mod repository;

pub use cache_dir::default_cache_dir;
pub use directory::{Directory, KEY_FILE};
pub use file_cache::{
    inspect_entry, EntryShape, FileCache, FileSlot, FolderSlot, WriteLockGuard, SUCCESS_MARKER,
};
pub use kv::KvCache;
pub use lock::{CacheLock, LOCK_FILE};
pub use repository::{slugify, CacheRepository, CacheSlot, DEFAULT_LOCK_TIMEOUT};
