//! Key-verified directory allocation.
//!
//! Under a parent directory every allocated subdirectory carries a `_KEY`
//! file. Allocating for a key returns the subdirectory whose `_KEY` matches,
//! or the first vacant candidate name. Candidates are tried in a fixed order
//! (`000`, `001`, ...), so the search is bounded by the number of existing
//! siblings plus one.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::lock::CacheLock;
use crate::error::{Error, IoContext, Result};

/// Name of the key file inside an allocated directory.
pub const KEY_FILE: &str = "_KEY";

/// Allocator rooted at a cache root.
#[derive(Debug, Clone)]
pub struct Directory {
    root: PathBuf,
    lock_timeout: Duration,
}

/// Content of one allocated directory.
enum Candidate {
    Vacant,
    Matching,
    Taken,
    /// Present but without a readable `_KEY`.
    Unverifiable,
}

impl Directory {
    pub fn new(root: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            lock_timeout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the subdirectory of `relpath` allocated to `key`, creating it
    /// when no sibling carries the same key.
    ///
    /// Allocation is serialized across processes by a `_LOCK` file in the
    /// parent directory.
    pub fn create_directory(&self, relpath: &Path, key: &Value) -> Result<PathBuf> {
        let parent = self.root.join(relpath);
        let _lock = CacheLock::acquire(&parent, self.lock_timeout)?;

        let siblings = allocated_names(&parent)?;
        for name in &siblings {
            let dir = parent.join(name);
            if let Candidate::Matching = inspect(&dir, key)? {
                debug!(dir = %dir.display(), "Reusing cache directory");
                return Ok(dir);
            }
        }

        // No sibling owns the key: take the first free or unverifiable name.
        for index in 0..=siblings.len() {
            let dir = parent.join(allocation_name(index));

            match inspect(&dir, key)? {
                Candidate::Matching | Candidate::Taken => continue,
                Candidate::Unverifiable => {
                    warn!(
                        dir = %dir.display(),
                        "Cache directory has no valid key file, recreating it"
                    );
                    fs::remove_dir_all(&dir).at_path(&dir)?;
                }
                Candidate::Vacant => {}
            }

            fs::create_dir_all(&dir).at_path(&dir)?;
            write_key(&dir, key)?;
            debug!(dir = %dir.display(), "Allocated cache directory");
            return Ok(dir);
        }

        Err(Error::AllocationExhausted(parent))
    }
}

/// Directory name of the `index`-th allocation.
pub fn allocation_name(index: usize) -> String {
    format!("{index:03}")
}

/// Names of allocated subdirectories of `parent`, sorted.
///
/// Plain files such as `_LOCK` are skipped.
pub fn allocated_names(parent: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if !parent.exists() {
        return Ok(names);
    }

    for entry in fs::read_dir(parent).at_path(parent)? {
        let entry = entry.at_path(parent)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !entry.path().is_dir() {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// Parsed `_KEY` of an allocated directory, `None` if missing or unreadable.
pub fn read_key(dir: &Path) -> Option<Value> {
    let content = fs::read_to_string(dir.join(KEY_FILE)).ok()?;
    serde_json::from_str(&content).ok()
}

fn inspect(dir: &Path, key: &Value) -> Result<Candidate> {
    if !dir.exists() {
        return Ok(Candidate::Vacant);
    }

    Ok(match read_key(dir) {
        Some(stored) if &stored == key => Candidate::Matching,
        Some(_) => Candidate::Taken,
        None => Candidate::Unverifiable,
    })
}

fn write_key(dir: &Path, key: &Value) -> Result<()> {
    let path = dir.join(KEY_FILE);
    let content = serde_json::to_string_pretty(key)?;

    let mut temp = NamedTempFile::new_in(dir).at_path(dir)?;
    temp.write_all(content.as_bytes()).at_path(&path)?;
    temp.persist(&path).map_err(|e| Error::io(&path, e.error))?;
    Ok(())
}
