//! Write-once file and folder entries inside a cache directory.
//!
//! A logical name `name.ext` lives in its own subdirectory `name/`, holding
//! the payload `data.ext` and a zero-byte `_SUCCESS` marker. Readers only
//! trust the marker: a payload without it is treated as absent, and the
//! marker is touched only after the writer returned successfully.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::lock::CacheLock;
use crate::error::{Error, IoContext, Result};

/// Marker whose presence commits an entry.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Payload name inside an entry, before the extension.
const PAYLOAD_STEM: &str = "data";

/// Handle on one reserved cache directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
    lock_timeout: Duration,
    write_lock: Arc<Mutex<HashMap<ThreadId, HeldLock>>>,
}

#[derive(Debug)]
struct HeldLock {
    _lock: CacheLock,
    depth: usize,
}

/// Number of markers and payloads found in one entry directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryShape {
    pub markers: usize,
    pub payloads: usize,
}

impl EntryShape {
    pub fn is_valid(&self) -> bool {
        self.markers == 1 && self.payloads == 1
    }
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            lock_timeout,
            write_lock: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a logical file name to its entry directory and payload path.
    ///
    /// The extension starts at the first dot of the last path component, so
    /// `model.tar.gz` keeps `.tar.gz`. A leading dot is part of the stem.
    pub fn split_filename(&self, name: &str) -> (PathBuf, PathBuf) {
        let (parent, last) = match name.rsplit_once('/') {
            Some((parent, last)) => (Some(parent), last),
            None => (None, name),
        };

        let split_at = last
            .char_indices()
            .skip(1)
            .find(|&(_, c)| c == '.')
            .map(|(i, _)| i);

        let (stem, ext) = match split_at {
            Some(i) => last.split_at(i),
            None => (last, ""),
        };

        let mut dir = self.root.clone();
        if let Some(parent) = parent {
            dir.push(parent);
        }
        dir.push(stem);

        let payload = dir.join(format!("{PAYLOAD_STEM}{ext}"));
        (dir, payload)
    }

    /// Whether the entry for `name` has been committed.
    pub fn has_file(&self, name: &str) -> bool {
        let (dir, _) = self.split_filename(name);
        dir.join(SUCCESS_MARKER).exists()
    }

    /// Payload path of a committed entry.
    pub fn get_file(&self, name: &str) -> Result<PathBuf> {
        if !self.has_file(name) {
            return Err(Error::FileNotFound(name.to_string()));
        }
        Ok(self.split_filename(name).1)
    }

    /// Reserve the entry for `name` and return a guard to write it through.
    ///
    /// Any stale marker is removed first. Call [`FileSlot::commit`] after the
    /// payload is written; dropping the guard leaves the entry uncommitted.
    pub fn reserve_file(&self, name: &str) -> Result<FileSlot<'_>> {
        let (dir, payload) = self.split_filename(name);
        self.reserve(&dir)?;
        Ok(FileSlot {
            cache: self,
            dir,
            path: payload,
        })
    }

    /// Run `write` with the payload path, then commit the entry.
    ///
    /// When `write` fails the marker is not created and the error is returned.
    pub fn open_file_path<T, F>(&self, name: &str, write: F) -> Result<T>
    where
        F: FnOnce(&Path) -> Result<T>,
    {
        let slot = self.reserve_file(name)?;
        let output = write(slot.path())?;
        slot.commit()?;
        Ok(output)
    }

    /// Run `write` with a buffered writer on the payload, then commit.
    pub fn open_file<T, F>(&self, name: &str, write: F) -> Result<T>
    where
        F: FnOnce(&mut BufWriter<File>) -> Result<T>,
    {
        self.open_file_path(name, |path| {
            let file = File::create(path).at_path(path)?;
            let mut writer = BufWriter::new(file);
            let output = write(&mut writer)?;
            writer.flush().at_path(path)?;
            Ok(output)
        })
    }

    /// Whether the folder entry `name` has been committed.
    pub fn has_folder(&self, name: &str) -> bool {
        self.root.join(name).join(SUCCESS_MARKER).exists()
    }

    /// Path of a committed folder entry.
    pub fn get_folder(&self, name: &str) -> Result<PathBuf> {
        if !self.has_folder(name) {
            return Err(Error::FolderNotFound(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    /// Reserve the folder entry `name`. The whole directory is the payload.
    pub fn reserve_folder(&self, name: &str) -> Result<FolderSlot> {
        let dir = self.root.join(name);
        self.reserve(&dir)?;
        Ok(FolderSlot { dir })
    }

    /// Run `write` with the folder path, then commit the folder.
    pub fn open_folder_path<T, F>(&self, name: &str, write: F) -> Result<T>
    where
        F: FnOnce(&Path) -> Result<T>,
    {
        let slot = self.reserve_folder(name)?;
        let output = write(slot.path())?;
        slot.commit()?;
        Ok(output)
    }

    /// Check that an entry holds exactly one marker and one payload.
    ///
    /// Problems are logged, never raised.
    pub fn validate_structure(&self, dir: &Path) -> bool {
        match inspect_entry(dir) {
            Ok(shape) if shape.is_valid() => true,
            Ok(shape) => {
                warn!(
                    dir = %dir.display(),
                    markers = shape.markers,
                    payloads = shape.payloads,
                    "Cache entry should contain exactly one success marker and one data file"
                );
                false
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Cannot inspect cache entry");
                false
            }
        }
    }

    /// Take the directory's `_LOCK`, waiting at most the lock timeout.
    ///
    /// The lock is re-entrant within a thread: nested calls share the file
    /// lock, which is released when the outermost guard drops.
    pub fn acquire_write_lock(&self) -> Result<WriteLockGuard> {
        let thread = thread::current().id();
        let mut held = self.held_locks();

        if let Some(entry) = held.get_mut(&thread) {
            entry.depth += 1;
            return Ok(WriteLockGuard {
                held: Arc::clone(&self.write_lock),
                thread,
            });
        }
        drop(held);

        let pid = std::process::id();
        info!(pid, dir = %self.root.display(), "Acquiring write lock");
        let lock = CacheLock::acquire(&self.root, self.lock_timeout)?;
        info!(pid, dir = %self.root.display(), "Acquired write lock");

        self.held_locks().insert(
            thread,
            HeldLock {
                _lock: lock,
                depth: 1,
            },
        );
        Ok(WriteLockGuard {
            held: Arc::clone(&self.write_lock),
            thread,
        })
    }

    fn held_locks(&self) -> MutexGuard<'_, HashMap<ThreadId, HeldLock>> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn reserve(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).at_path(dir)?;
        let marker = dir.join(SUCCESS_MARKER);
        if marker.exists() {
            debug!(dir = %dir.display(), "Removing stale success marker");
            fs::remove_file(&marker).at_path(&marker)?;
        }
        Ok(())
    }
}

/// Count markers and payloads of an entry directory.
pub fn inspect_entry(dir: &Path) -> Result<EntryShape> {
    let mut shape = EntryShape::default();
    for entry in fs::read_dir(dir).at_path(dir)? {
        let entry = entry.at_path(dir)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(SUCCESS_MARKER) {
            shape.markers += 1;
        } else if name == PAYLOAD_STEM || name.starts_with("data.") {
            shape.payloads += 1;
        }
    }
    Ok(shape)
}

fn touch_marker(dir: &Path) -> Result<()> {
    let marker = dir.join(SUCCESS_MARKER);
    File::create(&marker).at_path(&marker)?;
    Ok(())
}

/// Pending file entry. Commits only through [`FileSlot::commit`].
#[must_use = "the entry stays uncommitted unless `commit` is called"]
pub struct FileSlot<'a> {
    cache: &'a FileCache,
    dir: PathBuf,
    path: PathBuf,
}

impl FileSlot<'_> {
    /// Where the payload must be written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn commit(self) -> Result<()> {
        touch_marker(&self.dir)?;
        self.cache.validate_structure(&self.dir);
        Ok(())
    }
}

/// Pending folder entry. Commits only through [`FolderSlot::commit`].
#[must_use = "the folder stays uncommitted unless `commit` is called"]
pub struct FolderSlot {
    dir: PathBuf,
}

impl FolderSlot {
    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn commit(self) -> Result<()> {
        touch_marker(&self.dir)
    }
}

/// Releases one level of the re-entrant write lock on drop.
pub struct WriteLockGuard {
    held: Arc<Mutex<HashMap<ThreadId, HeldLock>>>,
    thread: ThreadId,
}

impl Drop for WriteLockGuard {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        let release = match held.get_mut(&self.thread) {
            Some(entry) => {
                entry.depth -= 1;
                entry.depth == 0
            }
            None => false,
        };
        if release {
            held.remove(&self.thread);
            debug!(pid = std::process::id(), "Released write lock");
        }
    }
}
