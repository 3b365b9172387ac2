//! Append-only event log: the single source of truth for a project.
//!
//! One JSON object per line. Appends happen under the meta-lock so that the
//! sequence number assignment (line count + 1) and the write itself are a
//! single atomic step from every other process's point of view; log order is
//! the one serialization point for the whole system.
//!
//! Reading is tolerant: a malformed line (corruption, crash mid-append) is
//! skipped with a warning rather than aborting the whole read. One bad record
//! must never lose the rest of history.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use thiserror::Error;
use tracing::warn;

use super::event::{CoordEvent, CoordEventPayload};
use super::fsync::fsync_file;
use super::meta_lock::{self, MetaLockError};
use super::workspace::Workspace;
use crate::types::{AgentId, SessionId};

/// Errors from event store operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error while encoding an event for append.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Could not acquire the log meta-lock within its bounded wait.
    #[error("log lock: {0}")]
    Lock(#[from] MetaLockError),

    /// The project root does not exist; coordination never creates it.
    #[error("project root not found: {0}")]
    ProjectNotFound(String),
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;

/// Appends one event to the project's live log.
///
/// Assigns `seq = current line count + 1`, stamps the envelope, serializes to
/// a single line, and writes it while holding the meta-lock, so the log grows
/// by exactly one line and no event is ever partially visible to another
/// process. Critical events are fsynced before the lock is released.
///
/// Fails before touching the lock if the project root does not exist; fails
/// with [`EventStoreError::Lock`] if the meta-lock cannot be acquired within
/// its 30-second bound (no partial event in either case).
pub fn append(
    ws: &Workspace,
    agent_id: &AgentId,
    session_id: &SessionId,
    payload: CoordEventPayload,
) -> Result<CoordEvent> {
    if !ws.project_root().is_dir() {
        return Err(EventStoreError::ProjectNotFound(
            ws.project_root().display().to_string(),
        ));
    }
    ws.ensure_dir()?;

    meta_lock::with_log_lock(ws, || {
        let path = ws.log_path();
        let seq = count_lines(&path)? + 1;
        let event = CoordEvent::new(agent_id.clone(), session_id.clone(), seq, payload);

        let json = serde_json::to_string(&event)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", json)?;

        if event.is_critical() {
            fsync_file(&file)?;
        }

        Ok(event)
    })
}

/// Reads all events from a log file, skipping malformed lines.
///
/// Returns the parsed events in log order plus the count of lines that failed
/// to parse. A missing file reads as empty.
pub fn read_events(path: &Path) -> io::Result<(Vec<CoordEvent>, usize)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };

    let reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut skipped = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<CoordEvent>(trimmed) {
            Ok(event) => events.push(event),
            Err(e) => {
                skipped += 1;
                warn!(
                    path = %path.display(),
                    line = idx + 1,
                    error = %e,
                    "skipping malformed event line"
                );
            }
        }
    }

    Ok((events, skipped))
}

/// Reads all events from the live log.
pub fn live_events(ws: &Workspace) -> io::Result<(Vec<CoordEvent>, usize)> {
    read_events(&ws.log_path())
}

/// Byte length of the live log; 0 if it does not exist.
pub fn log_len(ws: &Workspace) -> io::Result<u64> {
    match std::fs::metadata(ws.log_path()) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

/// Line count of the live log (valid or not); 0 if it does not exist.
pub fn event_count(ws: &Workspace) -> io::Result<u64> {
    count_lines(&ws.log_path())
}

fn count_lines(path: &Path) -> io::Result<u64> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let reader = BufReader::new(file);
    let mut count = 0u64;
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}
