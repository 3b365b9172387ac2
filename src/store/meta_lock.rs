//! Cross-process mutex around the event log.
//!
//! The primitive is "create a uniquely named directory atomically": `mkdir`
//! either succeeds (we hold the lock) or fails with `AlreadyExists` (someone
//! else does). This behaves identically on every POSIX filesystem, including
//! common network mounts, and needs no file-locking syscalls.
//!
//! The meta-lock is held only for the duration of a single append or rotation,
//! never across a whole acquire/release cycle of a higher-level file lock.
//! Contenders poll with short sleeps, bounded at 30 seconds; exceeding the
//! bound is a hard error, not a silent wait.
//!
//! [`MetaLockGuard`] removes the directory on drop, so the lock is released
//! even if the critical section panics.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::warn;

use super::workspace::Workspace;

/// Upper bound on how long a contender waits for the meta-lock.
pub const MAX_WAIT: Duration = Duration::from_secs(30);

/// Sleep between acquisition attempts while contended.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors from meta-lock acquisition.
#[derive(Debug, Error)]
pub enum MetaLockError {
    /// Another process held the lock for the whole bounded wait.
    #[error("timed out after {waited:?} waiting for log lock at {path}")]
    Timeout { waited: Duration, path: String },

    /// IO error creating or removing the lock directory.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for meta-lock operations.
pub type Result<T> = std::result::Result<T, MetaLockError>;

/// Scoped ownership of the meta-lock. Dropping the guard releases the lock.
#[derive(Debug)]
pub struct MetaLockGuard {
    path: PathBuf,
}

impl MetaLockGuard {
    /// Acquires the lock directory, polling up to `max_wait`.
    pub fn acquire(path: &Path, max_wait: Duration) -> Result<Self> {
        let start = Instant::now();

        loop {
            match std::fs::create_dir(path) {
                Ok(()) => {
                    return Ok(MetaLockGuard {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let waited = start.elapsed();
                    if waited >= max_wait {
                        return Err(MetaLockError::Timeout {
                            waited,
                            path: path.display().to_string(),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for MetaLockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir(&self.path) {
            // Nothing sensible to do here; the health checker removes
            // lock directories that outlive their holders.
            warn!(path = %self.path.display(), error = %e, "failed to release log lock");
        }
    }
}

/// Runs `f` while holding the workspace's log meta-lock.
///
/// The lock is released when `f` returns or panics.
pub fn with_log_lock<T, E, F>(ws: &Workspace, f: F) -> std::result::Result<T, E>
where
    F: FnOnce() -> std::result::Result<T, E>,
    E: From<MetaLockError>,
{
    let _guard = MetaLockGuard::acquire(&ws.meta_lock_path(), MAX_WAIT)?;
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_creates_and_drop_removes() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("coord.log.lock");

        {
            let _guard = MetaLockGuard::acquire(&lock_path, MAX_WAIT).unwrap();
            assert!(lock_path.is_dir());
        }
        assert!(!lock_path.exists());
    }

    #[test]
    fn contended_acquire_times_out() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("coord.log.lock");

        let _held = MetaLockGuard::acquire(&lock_path, MAX_WAIT).unwrap();

        let result = MetaLockGuard::acquire(&lock_path, Duration::from_millis(150));
        assert!(matches!(result, Err(MetaLockError::Timeout { .. })));
    }

    #[test]
    fn acquire_succeeds_after_holder_drops() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("coord.log.lock");

        let held = MetaLockGuard::acquire(&lock_path, MAX_WAIT).unwrap();
        drop(held);

        let _again = MetaLockGuard::acquire(&lock_path, Duration::from_millis(100)).unwrap();
    }

    #[test]
    fn with_log_lock_releases_on_success() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure_dir().unwrap();

        let out: Result<u32> = with_log_lock(&ws, || Ok(42));
        assert_eq!(out.unwrap(), 42);
        assert!(!ws.meta_lock_path().exists());
    }

    #[test]
    fn with_log_lock_releases_on_error() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure_dir().unwrap();

        let out: Result<()> = with_log_lock(&ws, || {
            Err(MetaLockError::Io(io::Error::other("inner failure")))
        });
        assert!(out.is_err());
        assert!(!ws.meta_lock_path().exists());
    }

    #[test]
    fn with_log_lock_releases_on_panic() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure_dir().unwrap();

        let ws_clone = ws.clone();
        let result = std::panic::catch_unwind(move || {
            let _: Result<()> = with_log_lock(&ws_clone, || panic!("boom"));
        });
        assert!(result.is_err());
        assert!(!ws.meta_lock_path().exists());
    }

    #[test]
    fn acquire_fails_when_parent_missing() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("missing").join("coord.log.lock");

        let result = MetaLockGuard::acquire(&lock_path, Duration::from_millis(100));
        assert!(matches!(result, Err(MetaLockError::Io(_))));
    }
}
