//! Log rotation: bounding the live log without losing history.
//!
//! When the live log crosses the event threshold it is renamed to
//! `coord.log.1` and a fresh empty live log takes its place. Existing
//! generations shift up (`.1` becomes `.2` and so on) and generations beyond
//! the configured keep count are deleted. The whole shuffle happens under the
//! meta-lock so no append can land mid-rotation, and every line that survives
//! pruning exists byte-for-byte in some generation afterwards.
//!
//! Rotation resets the snapshot's world: the fold only ever reads the live
//! log, so a forced rebuild immediately afterwards leaves an empty (but
//! valid) snapshot rather than a stale one keyed to the old log's length.

use std::fs::File;
use std::io;

use thiserror::Error;
use tracing::info;

use super::fsync::fsync_dir;
use super::log;
use super::meta_lock::{self, MetaLockError};
use super::snapshot::{self, SnapshotError};
use super::workspace::Workspace;

/// Errors from rotation.
#[derive(Debug, Error)]
pub enum RotationError {
    /// IO error shuffling log generations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Could not acquire the log meta-lock.
    #[error("log lock: {0}")]
    Lock(#[from] MetaLockError),

    /// Snapshot rebuild after rotation failed.
    #[error("snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Result type for rotation operations.
pub type Result<T> = std::result::Result<T, RotationError>;

/// What a rotation check decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// Below threshold and not forced; nothing changed.
    Skipped {
        /// Events currently in the live log.
        event_count: u64,
    },
    /// The live log was archived and replaced with a fresh one.
    Rotated {
        /// Lines moved into `coord.log.1`.
        events_archived: u64,
        /// Rotated generations deleted to honor the keep count.
        generations_pruned: u32,
    },
}

/// Rotates the live log if it holds at least `max_events` lines (or always,
/// when `force` is set).
///
/// `keep` bounds how many rotated generations survive; `keep == 0` archives
/// nothing and simply deletes the old live log after renaming it away.
pub fn check_and_rotate(
    ws: &Workspace,
    max_events: u64,
    keep: u32,
    force: bool,
) -> Result<RotationOutcome> {
    ws.ensure_dir()?;

    let outcome = meta_lock::with_log_lock(ws, || rotate_locked(ws, max_events, keep, force))?;

    if let RotationOutcome::Rotated {
        events_archived,
        generations_pruned,
    } = &outcome
    {
        info!(
            archived = events_archived,
            pruned = generations_pruned,
            "rotated coordination log"
        );
        // The live log is empty now; rebuild so the cached snapshot agrees.
        snapshot::rebuild(ws, true)?;
    }

    Ok(outcome)
}

fn rotate_locked(
    ws: &Workspace,
    max_events: u64,
    keep: u32,
    force: bool,
) -> Result<RotationOutcome> {
    let event_count = log::event_count(ws)?;
    if !force && event_count < max_events {
        return Ok(RotationOutcome::Skipped { event_count });
    }

    // Prune generations that would overflow the keep count once everything
    // shifts up by one.
    let mut generations_pruned = 0u32;
    for n in ws.rotated_generations()? {
        if n >= keep {
            std::fs::remove_file(ws.rotated_log_path(n))?;
            generations_pruned += 1;
        }
    }

    // Shift survivors up, highest first so nothing is overwritten.
    if keep > 0 {
        for n in (1..keep).rev() {
            let from = ws.rotated_log_path(n);
            if from.exists() {
                std::fs::rename(&from, ws.rotated_log_path(n + 1))?;
            }
        }
    }

    // Archive the live log (or drop it entirely when keep == 0).
    let live = ws.log_path();
    if live.exists() {
        if keep > 0 {
            std::fs::rename(&live, ws.rotated_log_path(1))?;
        } else {
            std::fs::remove_file(&live)?;
        }
    }

    // Fresh empty live log so appends never race a missing file.
    File::create(&live)?;
    fsync_dir(ws.dir())?;

    Ok(RotationOutcome::Rotated {
        events_archived: event_count,
        generations_pruned,
    })
}
