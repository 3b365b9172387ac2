//! Filesystem-backed event store.
//!
//! Everything a project's coordination knows lives under
//! `<project>/.agent-workspaces/`:
//!
//! - `coord.log` is the append-only source of truth (JSON Lines).
//! - `coord.log.lock` is a directory used as a cross-process mutex around
//!   appends and rotation.
//! - `coord-snapshot.json` is a cached fold of the log, safe to delete.
//! - `coord.log.1 … .N` are rotated generations, capped by configuration.
//!
//! Higher-level coordination (locks, heartbeats, compare-and-swap writes)
//! only ever appends events and folds snapshots; nothing outside
//! [`rotation`] rewrites or truncates a log file.

pub mod event;
pub mod fsync;
pub mod log;
pub mod meta_lock;
pub mod rotation;
pub mod snapshot;
pub mod workspace;

pub use event::{
    AcquireOutcome, CommitStatus, CoordEvent, CoordEventPayload, ReleaseOutcome,
};
pub use log::EventStoreError;
pub use meta_lock::{MetaLockError, MetaLockGuard};
pub use rotation::{RotationError, RotationOutcome};
pub use snapshot::{
    AgentState, AgentStatus, CoordStats, FileState, LockState, LogPosition, Snapshot,
    SnapshotError,
};
pub use workspace::Workspace;
