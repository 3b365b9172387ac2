//! Compare-and-swap file writes.
//!
//! A write names the content hash it believes the file currently has; if the
//! bytes on disk hash to something else, another agent got there first and
//! the write is refused. Locks reduce the window for this, CAS closes it:
//! even a writer that skipped locking cannot silently clobber a concurrent
//! change.
//!
//! The expected hash comes from, in order: the caller, the snapshot's last
//! known hash for the path, or the disk as read right now. `NEW_FILE` is the
//! baseline for a file that does not exist yet.
//!
//! Every write holds the path's lock for its duration and releases it on all
//! exits, conflict included.

use std::io;

use thiserror::Error;
use tracing::{info, warn};

use super::locks::{self, AcquireOptions, Acquisition, LockError};
use crate::store::event::{CommitStatus, CoordEventPayload};
use crate::store::fsync::{fsync_dir, fsync_file};
use crate::store::log::{self, EventStoreError};
use crate::store::snapshot::{self, SnapshotError};
use crate::store::workspace::Workspace;
use crate::types::{AgentId, ContentHash, SessionId};

/// Errors from CAS operations.
#[derive(Debug, Error)]
pub enum CasError {
    /// IO error reading or writing the content file.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failed to append an event.
    #[error("event store: {0}")]
    Store(#[from] EventStoreError),

    /// Failed to fold the snapshot.
    #[error("snapshot: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Lock acquisition or release failed.
    #[error("lock: {0}")]
    Lock(#[from] LockError),
}

/// Result type for CAS operations.
pub type Result<T> = std::result::Result<T, CasError>;

/// What a coordinated read returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCapture {
    /// File bytes, or `None` when the file does not exist.
    pub content: Option<Vec<u8>>,
    /// Hash of the bytes (or the new-file sentinel), as logged.
    pub hash: ContentHash,
}

/// Outcome of a CAS write attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file was written and the commit logged.
    Success { new_hash: ContentHash },
    /// The on-disk content did not match the expected baseline; nothing was
    /// written.
    Conflict {
        expected: ContentHash,
        actual: ContentHash,
    },
    /// Could not take the path's lock.
    LockFailure(Acquisition),
}

/// Reads a project file and logs the hash capture that becomes the caller's
/// CAS baseline.
pub fn read(
    ws: &Workspace,
    agent_id: &AgentId,
    session_id: &SessionId,
    path: &str,
) -> Result<ReadCapture> {
    let abs = ws.resolve(path);
    let content = match std::fs::read(&abs) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    let hash = match &content {
        Some(bytes) => ContentHash::of_bytes(bytes),
        None => ContentHash::new_file(),
    };

    log::append(
        ws,
        agent_id,
        session_id,
        CoordEventPayload::FileHashCapture {
            path: path.to_string(),
            hash: hash.clone(),
        },
    )?;

    Ok(ReadCapture { content, hash })
}

/// Writes a project file if its current content matches the expected hash.
///
/// Takes the path's lock first, compares, writes atomically on a match, logs
/// the commit either way, and releases the lock on every exit.
pub fn write(
    ws: &Workspace,
    agent_id: &AgentId,
    session_id: &SessionId,
    path: &str,
    content: &[u8],
    expected: Option<ContentHash>,
    lock_opts: &AcquireOptions,
) -> Result<WriteOutcome> {
    let acq = locks::acquire(ws, agent_id, session_id, path, lock_opts)?;
    let Acquisition::Granted { lock_id, .. } = acq else {
        return Ok(WriteOutcome::LockFailure(acq));
    };

    let outcome = commit_locked(ws, agent_id, session_id, path, content, expected);

    // The lock must not outlive the write attempt, whatever it returned.
    if let Err(e) = locks::release(ws, agent_id, session_id, &lock_id, false) {
        warn!(lock_id = %lock_id, error = %e, "failed to release lock after write");
        outcome?;
        return Err(e.into());
    }

    outcome
}

fn commit_locked(
    ws: &Workspace,
    agent_id: &AgentId,
    session_id: &SessionId,
    path: &str,
    content: &[u8],
    expected: Option<ContentHash>,
) -> Result<WriteOutcome> {
    let abs = ws.resolve(path);
    let actual = ContentHash::of_path(&abs)?;

    let expected = match expected {
        Some(h) => h,
        None => match baseline_from_snapshot(ws, path)? {
            Some(h) => h,
            // No recorded history; trust whatever is on disk right now.
            None => actual.clone(),
        },
    };

    if actual != expected {
        warn!(
            path,
            expected = %expected.short(),
            actual = %actual.short(),
            "write conflict"
        );
        log::append(
            ws,
            agent_id,
            session_id,
            CoordEventPayload::WriteCommit {
                path: path.to_string(),
                status: CommitStatus::Conflict,
                expected_hash: expected.clone(),
                new_hash: None,
            },
        )?;
        snapshot::rebuild(ws, true)?;
        return Ok(WriteOutcome::Conflict { expected, actual });
    }

    write_atomic(ws, path, content)?;
    let new_hash = ContentHash::of_bytes(content);

    log::append(
        ws,
        agent_id,
        session_id,
        CoordEventPayload::WriteCommit {
            path: path.to_string(),
            status: CommitStatus::Success,
            expected_hash: expected,
            new_hash: Some(new_hash.clone()),
        },
    )?;
    snapshot::rebuild(ws, true)?;

    info!(path, hash = %new_hash.short(), "committed write");
    Ok(WriteOutcome::Success { new_hash })
}

fn baseline_from_snapshot(ws: &Workspace, path: &str) -> Result<Option<ContentHash>> {
    let snap = snapshot::rebuild(ws, false)?;
    Ok(snap.files.get(path).and_then(|f| f.last_hash.clone()))
}

/// Writes content via a temp file and rename so readers never see a torn
/// file. Creates parent directories for new nested paths.
fn write_atomic(ws: &Workspace, path: &str, content: &[u8]) -> io::Result<()> {
    let abs = ws.resolve(path);

    let parent = abs
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    std::fs::create_dir_all(parent)?;

    let file_name = abs
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));

    {
        let mut file = std::fs::File::create(&tmp)?;
        io::Write::write_all(&mut file, content)?;
        fsync_file(&file)?;
    }
    std::fs::rename(&tmp, &abs)?;
    fsync_dir(parent)?;

    Ok(())
}
