use std::path::PathBuf;

/// Default cache root following platform conventions
///
/// - Linux/Unix: $XDG_CACHE_HOME/actorcache or ~/.cache/actorcache
/// - macOS: ~/Library/Caches/actorcache
/// - Windows: %LOCALAPPDATA%/actorcache
pub fn default_cache_dir() -> PathBuf {
    match dirs::cache_dir() {
        Some(cache_dir) => cache_dir.join("actorcache"),
        None => PathBuf::from(".actorcache/cache"),
    }
}
