//! Liveness signals and stale-agent detection.
//!
//! Agents emit heartbeats between units of work; any event counts as
//! liveness, so a busy agent appending commits never needs an explicit
//! heartbeat. An agent whose last event is older than the staleness
//! threshold is presumed crashed, and its locks become candidates for
//! forced release.
//!
//! Detection and cleanup are separate: `check_stale` always reports, and
//! only force-releases locks when asked to.

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use super::locks::{self, LockError};
use crate::store::event::{CoordEvent, CoordEventPayload};
use crate::store::log::{self, EventStoreError};
use crate::store::snapshot::{self, AgentStatus, LockState, SnapshotError};
use crate::store::workspace::Workspace;
use crate::types::{AgentId, LockId, SessionId};

/// Errors from heartbeat and staleness operations.
#[derive(Debug, Error)]
pub enum HeartbeatError {
    /// Failed to append an event.
    #[error("event store: {0}")]
    Store(#[from] EventStoreError),

    /// Failed to fold the snapshot.
    #[error("snapshot: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Failed to release a stale agent's lock.
    #[error("lock: {0}")]
    Lock(#[from] LockError),
}

/// Result type for heartbeat operations.
pub type Result<T> = std::result::Result<T, HeartbeatError>;

/// What a staleness check found (and, optionally, repaired).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaleReport {
    /// Agents past the threshold, sorted by ID.
    pub stale_agents: Vec<AgentId>,
    /// Locks held by stale agents at check time.
    pub stale_locks: Vec<LockState>,
    /// Locks force-released during cleanup. Empty unless cleanup ran.
    pub released_locks: Vec<LockId>,
}

impl StaleReport {
    /// True when no agent is past the threshold.
    pub fn is_clean(&self) -> bool {
        self.stale_agents.is_empty()
    }
}

/// Appends a heartbeat for the agent.
pub fn beat(ws: &Workspace, agent_id: &AgentId, session_id: &SessionId) -> Result<CoordEvent> {
    Ok(log::append(ws, agent_id, session_id, CoordEventPayload::Heartbeat)?)
}

/// Reports agents whose last event is older than `threshold_sec`, along with
/// the locks they hold.
///
/// With `cleanup` set, each stale agent's locks are force-released on its
/// behalf by the calling agent; the report lists what was released. Completed
/// agents are never stale regardless of age.
pub fn check_stale(
    ws: &Workspace,
    agent_id: &AgentId,
    session_id: &SessionId,
    threshold_sec: u64,
    cleanup: bool,
) -> Result<StaleReport> {
    let snap = snapshot::rebuild(ws, false)?;
    let now = Utc::now();

    let stale_agents: Vec<AgentId> = snap
        .stale_agents(now, threshold_sec)
        .into_iter()
        .cloned()
        .collect();

    let mut stale_locks: Vec<LockState> = snap
        .locks
        .values()
        .filter(|lock| stale_agents.contains(&lock.owner_agent))
        .cloned()
        .collect();
    stale_locks.sort_by(|a, b| a.lock_id.as_str().cmp(b.lock_id.as_str()));

    for agent in &stale_agents {
        warn!(
            agent = %agent,
            threshold_sec,
            "agent is stale"
        );
    }

    let mut released_locks = Vec::new();
    if cleanup {
        for lock in &stale_locks {
            match locks::release(ws, agent_id, session_id, &lock.lock_id, true)? {
                locks::ReleaseResult::Released { .. } => {
                    info!(
                        lock_id = %lock.lock_id,
                        owner = %lock.owner_agent,
                        "released stale agent's lock"
                    );
                    released_locks.push(lock.lock_id.clone());
                }
                // Raced with a concurrent release or takeover; nothing to do.
                other => {
                    warn!(lock_id = %lock.lock_id, ?other, "stale lock vanished before cleanup");
                }
            }
        }
    }

    Ok(StaleReport {
        stale_agents,
        stale_locks,
        released_locks,
    })
}

/// Convenience view: active agents that are not stale.
pub fn live_agents(ws: &Workspace, threshold_sec: u64) -> Result<Vec<AgentId>> {
    let snap = snapshot::rebuild(ws, false)?;
    let now = Utc::now();

    let mut live: Vec<AgentId> = snap
        .agents
        .iter()
        .filter(|(_, state)| {
            state.status == AgentStatus::Active
                && (now - state.last_seen).num_seconds() <= threshold_sec as i64
        })
        .map(|(id, _)| id.clone())
        .collect();
    live.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    Ok(live)
}
