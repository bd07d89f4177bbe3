//! Advisory `_LOCK` files guarding cache directories.
//!
//! A [`CacheLock`] is held for the duration of a critical section and
//! released on drop. Waiting is bounded by a timeout; contention longer than
//! half a second is reported once.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Error, IoContext, Result};

/// Name of the lock file inside a locked directory.
pub const LOCK_FILE: &str = "_LOCK";

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const CONTENTION_WARNING: Duration = Duration::from_millis(500);

/// Exclusive advisory lock on a directory.
pub struct CacheLock {
    path: PathBuf,
    #[cfg(unix)]
    _file: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

impl CacheLock {
    /// Acquire the lock on `dir`, waiting at most `timeout`.
    ///
    /// Creates `dir` when it does not exist yet.
    pub fn acquire(dir: &Path, timeout: Duration) -> Result<Self> {
        fs::create_dir_all(dir).at_path(dir)?;

        let path = dir.join(LOCK_FILE);
        let start = Instant::now();
        let mut warned = false;

        loop {
            match try_lock(&path) {
                Ok(file) => {
                    if warned {
                        debug!(
                            lock = %path.display(),
                            waited_secs = start.elapsed().as_secs_f64(),
                            "Lock acquired after contention"
                        );
                    }
                    return Ok(Self { path, _file: file });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if !warned && start.elapsed() > CONTENTION_WARNING {
                        warn!(lock = %path.display(), "Lock contention, waiting");
                        warned = true;
                    }
                }
                Err(e) => return Err(Error::io(&path, e)),
            }

            if start.elapsed() >= timeout {
                return Err(Error::LockTimeout { path, timeout });
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for CacheLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLock").field("path", &self.path).finish()
    }
}

#[cfg(unix)]
fn try_lock(path: &Path) -> io::Result<nix::fcntl::Flock<File>> {
    use nix::errno::Errno;
    use nix::fcntl::{Flock, FlockArg};

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(locked) => Ok(locked),
        Err((_, Errno::EWOULDBLOCK)) => Err(io::ErrorKind::WouldBlock.into()),
        Err((_, errno)) => Err(io::Error::from(errno)),
    }
}

#[cfg(not(unix))]
fn try_lock(path: &Path) -> io::Result<File> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(io::ErrorKind::WouldBlock.into()),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
