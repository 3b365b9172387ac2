//! Event types for the coordination log.
//!
//! Events are appended to the log in JSON Lines format. Each event carries an
//! envelope (`event_id`, `ts`, `agent_id`, `session_id`, `seq`) and a payload
//! flattened into the same JSON object, tagged by `event_type`.
//!
//! Example line:
//! ```json
//! {"event_id":"evt-1712000000000-3fa2b1","ts":"2024-04-01T20:13:20Z","agent_id":"a1","session_id":"s1","seq":1,"event_type":"heartbeat"}
//! ```
//!
//! Events are immutable facts: nothing ever rewrites or removes a line except
//! whole-log rotation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AgentId, ContentHash, EventId, LockId, SessionId};

/// One event in a project's coordination log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordEvent {
    /// Globally unique within the project; time-prefixed for rough ordering.
    pub event_id: EventId,

    /// When the event was appended (UTC).
    pub ts: DateTime<Utc>,

    /// The agent that produced the event.
    pub agent_id: AgentId,

    /// The session the agent belongs to.
    pub session_id: SessionId,

    /// 1-based position in the log at append time. Strictly increasing per
    /// log generation.
    pub seq: u64,

    /// The event payload, flattened into the JSON object.
    #[serde(flatten)]
    pub payload: CoordEventPayload,
}

/// Current time truncated to millisecond precision.
///
/// Every timestamp that reaches the log goes through this; sub-millisecond
/// digits would survive a serde round trip but are noise on the wire.
pub fn now_ms() -> DateTime<Utc> {
    truncate_ms(Utc::now())
}

fn truncate_ms(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts - chrono::Duration::nanoseconds((ts.timestamp_subsec_nanos() % 1_000_000) as i64)
}

impl CoordEvent {
    /// Builds a new event stamped with the current time and a fresh ID.
    pub fn new(
        agent_id: AgentId,
        session_id: SessionId,
        seq: u64,
        payload: CoordEventPayload,
    ) -> Self {
        let ts = now_ms();
        CoordEvent {
            event_id: EventId::generate(ts),
            ts,
            agent_id,
            session_id,
            seq,
            payload,
        }
    }

    /// Returns true if this event must be durable before the operation that
    /// produced it proceeds.
    ///
    /// Lock decisions, write commits, and lifecycle transitions are critical:
    /// losing one after acting on it would let two agents believe different
    /// things about who holds a lock or what a file contains. Heartbeats and
    /// read-side hash captures are cheap signals that can be re-emitted.
    pub fn is_critical(&self) -> bool {
        self.payload.is_critical()
    }
}

/// Outcome recorded on a `lock_acquire` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquireOutcome {
    /// The lock was granted to the requesting agent.
    Granted,
    /// The request was denied (contention). Folded as a no-op.
    Denied,
}

/// Outcome recorded on a `lock_release` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    /// Released by its owner.
    Released,
    /// Released on behalf of another agent (stale-lock cleanup, repair).
    ForceReleased,
}

/// Status recorded on a `write_commit` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStatus {
    /// The compare-and-swap succeeded and the file was written.
    Success,
    /// The on-disk hash diverged from the expected baseline; nothing written.
    Conflict,
}

/// Payload of a coordination event, tagged by `event_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum CoordEventPayload {
    /// An agent announces itself and the files it intends to touch.
    RegisterIntent {
        /// Identifier of this intent declaration.
        intent_id: String,
        /// Human-readable summary of what the agent is doing.
        task_summary: String,
        /// Project-relative paths the agent expects to edit.
        files: Vec<String>,
    },

    /// Read-side hash capture, establishing the CAS baseline for a file.
    FileHashCapture {
        /// Project-relative path that was read.
        path: String,
        /// Hash of the bytes read (or `NEW_FILE`).
        hash: ContentHash,
    },

    /// A lock decision. Only `outcome: granted` creates a lock in the
    /// snapshot; other outcomes are recorded for audit and folded as no-ops.
    LockAcquire {
        lock_id: LockId,
        /// Project-relative path the lock covers.
        path: String,
        outcome: AcquireOutcome,
        acquired_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        ttl_sec: u64,
    },

    /// A lock was released (by owner or by force).
    LockRelease {
        lock_id: LockId,
        outcome: ReleaseOutcome,
    },

    /// Result of a compare-and-swap write attempt.
    WriteCommit {
        /// Project-relative path that was written (or would have been).
        path: String,
        status: CommitStatus,
        /// The baseline hash the writer compared against.
        expected_hash: ContentHash,
        /// Hash of the committed content; absent on conflict.
        #[serde(skip_serializing_if = "Option::is_none")]
        new_hash: Option<ContentHash>,
    },

    /// Periodic liveness signal. No payload beyond the envelope.
    Heartbeat,

    /// Terminal lifecycle event: the agent finished its work.
    AgentComplete,
}

impl CoordEventPayload {
    /// Returns true if this payload requires immediate fsync. See
    /// [`CoordEvent::is_critical`].
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            CoordEventPayload::RegisterIntent { .. }
                | CoordEventPayload::LockAcquire { .. }
                | CoordEventPayload::LockRelease { .. }
                | CoordEventPayload::WriteCommit { .. }
                | CoordEventPayload::AgentComplete
        )
    }

    /// The wire name of this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            CoordEventPayload::RegisterIntent { .. } => "register_intent",
            CoordEventPayload::FileHashCapture { .. } => "file_hash_capture",
            CoordEventPayload::LockAcquire { .. } => "lock_acquire",
            CoordEventPayload::LockRelease { .. } => "lock_release",
            CoordEventPayload::WriteCommit { .. } => "write_commit",
            CoordEventPayload::Heartbeat => "heartbeat",
            CoordEventPayload::AgentComplete => "agent_complete",
        }
    }
}
