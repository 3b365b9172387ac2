//! Snapshot: a pure fold of the event log into current state.
//!
//! The snapshot is derived data. It can be deleted at any time and rebuilt
//! from the log; two rebuilds over the same log bytes produce the same state
//! (only `generated_at` differs). The cached copy on disk is keyed by the log
//! byte length it was folded from, so a rebuild is a no-op when nothing has
//! been appended since.
//!
//! Fold rules, in log order:
//! - `register_intent` creates or resets the agent's entry.
//! - every event from a known agent advances that agent's `last_seen`.
//! - a granted `lock_acquire` installs a lock, displacing any earlier lock on
//!   the same path (log order is the serialization point, so a later grant
//!   means the earlier lock was expired or released out of band).
//! - `lock_release` removes the lock by ID, whoever emitted it.
//! - a successful `write_commit` becomes the file's new hash baseline.
//! - `agent_complete` marks the agent completed; completed agents are never
//!   considered stale.

use std::collections::HashMap;
use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::event::{AcquireOutcome, CommitStatus, CoordEvent, CoordEventPayload};
use super::fsync::{fsync_dir, fsync_file};
use super::log;
use super::workspace::Workspace;
use crate::types::{AgentId, ContentHash, EventId, LockId};

/// Format version of the on-disk snapshot. Mismatches force a rebuild.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors from snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// IO error reading the log or writing the snapshot.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error encoding the snapshot.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Position in the live log a snapshot was folded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPosition {
    /// Byte length of the live log at fold time. The cache key.
    pub byte_offset: u64,
    /// ID of the last event folded, if any.
    pub last_event_id: Option<EventId>,
    /// Number of events folded.
    pub event_count: u64,
}

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered and presumed working.
    Active,
    /// Emitted `agent_complete`. Exempt from staleness.
    Completed,
}

/// Folded state of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    /// Timestamp of the agent's first (or most recent) `register_intent`.
    pub registered_at: DateTime<Utc>,
    /// Timestamp of the agent's most recent event of any kind.
    pub last_seen: DateTime<Utc>,
    pub status: AgentStatus,
    pub task_summary: String,
    /// Intent ID from the latest registration.
    pub current_intent_id: Option<String>,
    /// Files the agent declared it intends to touch.
    pub files_intent: Vec<String>,
}

/// Folded state of one live lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockState {
    pub lock_id: LockId,
    /// Project-relative path the lock covers.
    pub file_path: String,
    pub owner_agent: AgentId,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ttl_sec: u64,
}

impl LockState {
    /// Whether the lock's TTL had elapsed as of `now`.
    ///
    /// Expiry is an evaluation-time predicate; expired locks stay in the
    /// snapshot until released or displaced by a later grant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Folded per-file read/write history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    /// Most recent known hash (from a capture or a successful commit).
    pub last_hash: Option<ContentHash>,
    pub last_reader: Option<AgentId>,
    pub last_read_ts: Option<DateTime<Utc>>,
    pub last_writer: Option<AgentId>,
    pub last_write_ts: Option<DateTime<Utc>>,
}

/// Aggregate counters over the folded events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordStats {
    pub total_events: u64,
    pub total_conflicts: u64,
    pub total_successful_writes: u64,
}

/// Current coordination state of a project, derived from its live log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub log_position: LogPosition,
    pub agents: HashMap<AgentId, AgentState>,
    pub locks: HashMap<LockId, LockState>,
    /// Keyed by project-relative path.
    pub files: HashMap<String, FileState>,
    pub stats: CoordStats,
}

impl Snapshot {
    /// An empty snapshot over an empty log.
    pub fn empty() -> Self {
        Snapshot {
            version: SNAPSHOT_VERSION,
            generated_at: Utc::now(),
            log_position: LogPosition {
                byte_offset: 0,
                last_event_id: None,
                event_count: 0,
            },
            agents: HashMap::new(),
            locks: HashMap::new(),
            files: HashMap::new(),
            stats: CoordStats::default(),
        }
    }

    /// The live lock covering `path`, if any.
    pub fn lock_on_path(&self, path: &str) -> Option<&LockState> {
        self.locks.values().find(|l| l.file_path == path)
    }

    /// Agents whose last event is older than `threshold_sec` as of `now`.
    /// Completed agents are never stale.
    pub fn stale_agents(&self, now: DateTime<Utc>, threshold_sec: u64) -> Vec<&AgentId> {
        let mut stale: Vec<&AgentId> = self
            .agents
            .iter()
            .filter(|(_, state)| {
                state.status != AgentStatus::Completed
                    && (now - state.last_seen).num_seconds() > threshold_sec as i64
            })
            .map(|(id, _)| id)
            .collect();
        stale.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        stale
    }
}

/// Folds a sequence of events into a snapshot.
///
/// Pure and deterministic given the events and byte offset; `generated_at`
/// is the only field stamped with wall-clock time.
pub fn fold(events: &[CoordEvent], byte_offset: u64) -> Snapshot {
    let mut snapshot = Snapshot::empty();
    snapshot.log_position = LogPosition {
        byte_offset,
        last_event_id: events.last().map(|e| e.event_id.clone()),
        event_count: events.len() as u64,
    };
    snapshot.stats.total_events = events.len() as u64;

    for event in events {
        apply(&mut snapshot, event);
    }

    snapshot
}

fn apply(snapshot: &mut Snapshot, event: &CoordEvent) {
    // Any event from a known agent counts as liveness.
    if let Some(agent) = snapshot.agents.get_mut(&event.agent_id) {
        if event.ts > agent.last_seen {
            agent.last_seen = event.ts;
        }
    }

    match &event.payload {
        CoordEventPayload::RegisterIntent {
            intent_id,
            task_summary,
            files,
        } => {
            snapshot.agents.insert(
                event.agent_id.clone(),
                AgentState {
                    registered_at: event.ts,
                    last_seen: event.ts,
                    status: AgentStatus::Active,
                    task_summary: task_summary.clone(),
                    current_intent_id: Some(intent_id.clone()),
                    files_intent: files.clone(),
                },
            );
        }

        CoordEventPayload::FileHashCapture { path, hash } => {
            let file = snapshot.files.entry(path.clone()).or_default();
            file.last_hash = Some(hash.clone());
            file.last_reader = Some(event.agent_id.clone());
            file.last_read_ts = Some(event.ts);
        }

        CoordEventPayload::LockAcquire {
            lock_id,
            path,
            outcome,
            acquired_at,
            expires_at,
            ttl_sec,
        } => {
            if *outcome != AcquireOutcome::Granted {
                return;
            }
            // A later grant on the same path displaces the earlier lock.
            let displaced: Vec<LockId> = snapshot
                .locks
                .iter()
                .filter(|(_, l)| l.file_path == *path)
                .map(|(id, _)| id.clone())
                .collect();
            for id in displaced {
                snapshot.locks.remove(&id);
            }
            snapshot.locks.insert(
                lock_id.clone(),
                LockState {
                    lock_id: lock_id.clone(),
                    file_path: path.clone(),
                    owner_agent: event.agent_id.clone(),
                    acquired_at: *acquired_at,
                    expires_at: *expires_at,
                    ttl_sec: *ttl_sec,
                },
            );
        }

        CoordEventPayload::LockRelease { lock_id, .. } => {
            snapshot.locks.remove(lock_id);
        }

        CoordEventPayload::WriteCommit {
            path,
            status,
            new_hash,
            ..
        } => match status {
            CommitStatus::Success => {
                let file = snapshot.files.entry(path.clone()).or_default();
                file.last_hash = new_hash.clone();
                file.last_writer = Some(event.agent_id.clone());
                file.last_write_ts = Some(event.ts);
                snapshot.stats.total_successful_writes += 1;
            }
            CommitStatus::Conflict => {
                snapshot.stats.total_conflicts += 1;
            }
        },

        CoordEventPayload::Heartbeat => {}

        CoordEventPayload::AgentComplete => {
            if let Some(agent) = snapshot.agents.get_mut(&event.agent_id) {
                agent.status = AgentStatus::Completed;
            }
        }
    }
}

/// Returns the current snapshot, rebuilding from the log when needed.
///
/// When `force` is false and the cached snapshot's byte offset matches the
/// live log's current length, the cache is returned as-is. Otherwise the log
/// is re-read, folded, and the cache rewritten atomically.
pub fn rebuild(ws: &Workspace, force: bool) -> Result<Snapshot> {
    let log_len = log::log_len(ws)?;

    if !force {
        if let Some(cached) = try_load(ws)? {
            if cached.log_position.byte_offset == log_len {
                debug!(byte_offset = log_len, "snapshot cache hit");
                return Ok(cached);
            }
        }
    }

    let (events, skipped) = log::live_events(ws)?;
    if skipped > 0 {
        warn!(skipped, "folded snapshot over log with malformed lines");
    }

    let snapshot = fold(&events, log_len);
    save_atomic(ws, &snapshot)?;
    Ok(snapshot)
}

/// Loads the cached snapshot, treating anything unusable as absent.
///
/// Missing file, malformed JSON, and version mismatches all return `Ok(None)`
/// so the caller falls through to a rebuild.
pub fn try_load(ws: &Workspace) -> Result<Option<Snapshot>> {
    let path = ws.snapshot_path();
    let data = match std::fs::read_to_string(&path) {
        Ok(d) => d,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_str::<Snapshot>(&data) {
        Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => Ok(Some(snapshot)),
        Ok(snapshot) => {
            warn!(
                found = snapshot.version,
                expected = SNAPSHOT_VERSION,
                "snapshot version mismatch, will rebuild"
            );
            Ok(None)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable snapshot, will rebuild");
            Ok(None)
        }
    }
}

/// Writes the snapshot atomically: temp file, fsync, rename, directory fsync.
///
/// Readers always see either the old snapshot or the new one, never a torn
/// write.
pub fn save_atomic(ws: &Workspace, snapshot: &Snapshot) -> Result<()> {
    ws.ensure_dir()?;

    let final_path = ws.snapshot_path();
    let tmp_path = final_path.with_extension("json.tmp");

    let json = serde_json::to_string_pretty(snapshot)?;
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        io::Write::write_all(&mut file, json.as_bytes())?;
        fsync_file(&file)?;
    }

    std::fs::rename(&tmp_path, &final_path)?;
    fsync_dir(ws.dir())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::event::ReleaseOutcome;
    use crate::types::SessionId;
    use chrono::Duration;
    use tempfile::tempdir;

    fn agent(n: &str) -> AgentId {
        AgentId::new(n)
    }

    fn event(
        agent_id: &str,
        seq: u64,
        ts: DateTime<Utc>,
        payload: CoordEventPayload,
    ) -> CoordEvent {
        CoordEvent {
            event_id: EventId::generate(ts),
            ts,
            agent_id: agent(agent_id),
            session_id: SessionId::new("s1"),
            seq,
            payload,
        }
    }

    fn register(agent_id: &str, seq: u64, ts: DateTime<Utc>, files: &[&str]) -> CoordEvent {
        event(
            agent_id,
            seq,
            ts,
            CoordEventPayload::RegisterIntent {
                intent_id: format!("intent-{}", seq),
                task_summary: "test task".into(),
                files: files.iter().map(|s| s.to_string()).collect(),
            },
        )
    }

    fn grant(
        agent_id: &str,
        seq: u64,
        ts: DateTime<Utc>,
        lock_id: &str,
        path: &str,
        ttl_sec: u64,
    ) -> CoordEvent {
        event(
            agent_id,
            seq,
            ts,
            CoordEventPayload::LockAcquire {
                lock_id: LockId::from(lock_id),
                path: path.into(),
                outcome: AcquireOutcome::Granted,
                acquired_at: ts,
                expires_at: ts + Duration::seconds(ttl_sec as i64),
                ttl_sec,
            },
        )
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    // ─── Fold rules ───

    #[test]
    fn empty_log_folds_to_empty_snapshot() {
        let snap = fold(&[], 0);
        assert!(snap.agents.is_empty());
        assert!(snap.locks.is_empty());
        assert!(snap.files.is_empty());
        assert_eq!(snap.stats, CoordStats::default());
        assert_eq!(snap.log_position.event_count, 0);
        assert!(snap.log_position.last_event_id.is_none());
    }

    #[test]
    fn register_creates_agent() {
        let snap = fold(&[register("a1", 1, t0(), &["src/a.rs"])], 100);

        let state = &snap.agents[&agent("a1")];
        assert_eq!(state.status, AgentStatus::Active);
        assert_eq!(state.registered_at, t0());
        assert_eq!(state.last_seen, t0());
        assert_eq!(state.files_intent, vec!["src/a.rs"]);
        assert_eq!(state.current_intent_id.as_deref(), Some("intent-1"));
    }

    #[test]
    fn any_event_advances_last_seen() {
        let later = t0() + Duration::seconds(60);
        let snap = fold(
            &[
                register("a1", 1, t0(), &[]),
                event("a1", 2, later, CoordEventPayload::Heartbeat),
            ],
            100,
        );
        assert_eq!(snap.agents[&agent("a1")].last_seen, later);
    }

    #[test]
    fn events_before_registration_do_not_create_agents() {
        let snap = fold(&[event("ghost", 1, t0(), CoordEventPayload::Heartbeat)], 50);
        assert!(snap.agents.is_empty());
    }

    #[test]
    fn granted_lock_appears_denied_does_not() {
        let denied = event(
            "a2",
            2,
            t0(),
            CoordEventPayload::LockAcquire {
                lock_id: LockId::from("lock-2"),
                path: "f.txt".into(),
                outcome: AcquireOutcome::Denied,
                acquired_at: t0(),
                expires_at: t0() + Duration::seconds(300),
                ttl_sec: 300,
            },
        );
        let snap = fold(&[grant("a1", 1, t0(), "lock-1", "f.txt", 300), denied], 200);

        assert_eq!(snap.locks.len(), 1);
        let lock = snap.lock_on_path("f.txt").unwrap();
        assert_eq!(lock.lock_id, LockId::from("lock-1"));
        assert_eq!(lock.owner_agent, agent("a1"));
        assert_eq!(lock.ttl_sec, 300);
    }

    #[test]
    fn later_grant_displaces_earlier_lock_on_same_path() {
        let later = t0() + Duration::seconds(400);
        let snap = fold(
            &[
                grant("a1", 1, t0(), "lock-1", "f.txt", 300),
                grant("a2", 2, later, "lock-2", "f.txt", 300),
            ],
            200,
        );

        assert_eq!(snap.locks.len(), 1);
        let lock = snap.lock_on_path("f.txt").unwrap();
        assert_eq!(lock.lock_id, LockId::from("lock-2"));
        assert_eq!(lock.owner_agent, agent("a2"));
    }

    #[test]
    fn release_removes_lock_by_id() {
        let release = event(
            "a1",
            2,
            t0() + Duration::seconds(10),
            CoordEventPayload::LockRelease {
                lock_id: LockId::from("lock-1"),
                outcome: ReleaseOutcome::Released,
            },
        );
        let snap = fold(&[grant("a1", 1, t0(), "lock-1", "f.txt", 300), release], 200);
        assert!(snap.locks.is_empty());
    }

    #[test]
    fn release_of_unknown_lock_is_noop() {
        let release = event(
            "a1",
            1,
            t0(),
            CoordEventPayload::LockRelease {
                lock_id: LockId::from("lock-missing"),
                outcome: ReleaseOutcome::ForceReleased,
            },
        );
        let snap = fold(&[release], 80);
        assert!(snap.locks.is_empty());
    }

    #[test]
    fn successful_write_updates_file_baseline() {
        let hash = ContentHash::of_bytes(b"new content");
        let commit = event(
            "a1",
            1,
            t0(),
            CoordEventPayload::WriteCommit {
                path: "f.txt".into(),
                status: CommitStatus::Success,
                expected_hash: ContentHash::new_file(),
                new_hash: Some(hash.clone()),
            },
        );
        let snap = fold(&[commit], 150);

        let file = &snap.files["f.txt"];
        assert_eq!(file.last_hash.as_ref(), Some(&hash));
        assert_eq!(file.last_writer.as_ref(), Some(&agent("a1")));
        assert_eq!(file.last_write_ts, Some(t0()));
        assert_eq!(snap.stats.total_successful_writes, 1);
        assert_eq!(snap.stats.total_conflicts, 0);
    }

    #[test]
    fn conflict_counts_but_does_not_touch_file_state() {
        let capture = event(
            "a1",
            1,
            t0(),
            CoordEventPayload::FileHashCapture {
                path: "f.txt".into(),
                hash: ContentHash::of_bytes(b"old"),
            },
        );
        let conflict = event(
            "a2",
            2,
            t0() + Duration::seconds(5),
            CoordEventPayload::WriteCommit {
                path: "f.txt".into(),
                status: CommitStatus::Conflict,
                expected_hash: ContentHash::of_bytes(b"stale"),
                new_hash: None,
            },
        );
        let snap = fold(&[capture, conflict], 250);

        assert_eq!(snap.stats.total_conflicts, 1);
        let file = &snap.files["f.txt"];
        assert_eq!(file.last_hash, Some(ContentHash::of_bytes(b"old")));
        assert!(file.last_writer.is_none());
    }

    #[test]
    fn capture_records_reader_side() {
        let hash = ContentHash::of_bytes(b"content");
        let capture = event(
            "a1",
            1,
            t0(),
            CoordEventPayload::FileHashCapture {
                path: "src/x.rs".into(),
                hash: hash.clone(),
            },
        );
        let snap = fold(&[capture], 90);

        let file = &snap.files["src/x.rs"];
        assert_eq!(file.last_hash.as_ref(), Some(&hash));
        assert_eq!(file.last_reader.as_ref(), Some(&agent("a1")));
        assert!(file.last_writer.is_none());
    }

    #[test]
    fn complete_marks_agent_completed() {
        let snap = fold(
            &[
                register("a1", 1, t0(), &[]),
                event(
                    "a1",
                    2,
                    t0() + Duration::seconds(30),
                    CoordEventPayload::AgentComplete,
                ),
            ],
            120,
        );
        assert_eq!(snap.agents[&agent("a1")].status, AgentStatus::Completed);
    }

    #[test]
    fn fold_is_deterministic() {
        let events = vec![
            register("a1", 1, t0(), &["f.txt"]),
            grant("a1", 2, t0() + Duration::seconds(1), "lock-1", "f.txt", 300),
            event(
                "a1",
                3,
                t0() + Duration::seconds(2),
                CoordEventPayload::Heartbeat,
            ),
        ];

        let a = fold(&events, 300);
        let b = fold(&events, 300);
        assert_eq!(a.agents, b.agents);
        assert_eq!(a.locks, b.locks);
        assert_eq!(a.files, b.files);
        assert_eq!(a.stats, b.stats);
        assert_eq!(a.log_position, b.log_position);
    }

    // ─── Staleness ───

    #[test]
    fn stale_agents_respect_threshold_and_completion() {
        let now = t0() + Duration::seconds(200);
        let snap = fold(
            &[
                register("slow", 1, t0(), &[]),
                register("done", 2, t0(), &[]),
                event("done", 3, t0(), CoordEventPayload::AgentComplete),
                register("fresh", 4, now - Duration::seconds(10), &[]),
            ],
            400,
        );

        let stale = snap.stale_agents(now, 120);
        assert_eq!(stale, vec![&agent("slow")]);
    }

    // ─── Expiry predicate ───

    #[test]
    fn lock_expiry_is_evaluation_time() {
        let snap = fold(&[grant("a1", 1, t0(), "lock-1", "f.txt", 300)], 100);
        let lock = snap.lock_on_path("f.txt").unwrap();

        assert!(!lock.is_expired_at(t0() + Duration::seconds(299)));
        assert!(lock.is_expired_at(t0() + Duration::seconds(300)));
        // The lock stays in the snapshot regardless.
        assert_eq!(snap.locks.len(), 1);
    }

    // ─── Cache and persistence ───

    #[test]
    fn rebuild_caches_by_byte_offset() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());

        log::append(
            &ws,
            &agent("a1"),
            &SessionId::new("s1"),
            CoordEventPayload::Heartbeat,
        )
        .unwrap();

        let first = rebuild(&ws, false).unwrap();
        assert!(ws.snapshot_path().exists());

        // No appends since; cache hit returns the identical snapshot.
        let second = rebuild(&ws, false).unwrap();
        assert_eq!(first.generated_at, second.generated_at);
        assert_eq!(first.log_position, second.log_position);

        // An append invalidates the cache.
        log::append(
            &ws,
            &agent("a1"),
            &SessionId::new("s1"),
            CoordEventPayload::Heartbeat,
        )
        .unwrap();
        let third = rebuild(&ws, false).unwrap();
        assert_eq!(third.log_position.event_count, 2);
    }

    #[test]
    fn force_rebuild_refolds_even_on_cache_hit() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());

        log::append(
            &ws,
            &agent("a1"),
            &SessionId::new("s1"),
            CoordEventPayload::Heartbeat,
        )
        .unwrap();

        let first = rebuild(&ws, false).unwrap();
        let second = rebuild(&ws, true).unwrap();
        assert_eq!(first.log_position, second.log_position);
        assert_eq!(first.stats, second.stats);
    }

    #[test]
    fn corrupt_cached_snapshot_is_rebuilt() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());

        log::append(
            &ws,
            &agent("a1"),
            &SessionId::new("s1"),
            CoordEventPayload::Heartbeat,
        )
        .unwrap();
        rebuild(&ws, false).unwrap();

        std::fs::write(ws.snapshot_path(), "{garbage").unwrap();
        let snap = rebuild(&ws, false).unwrap();
        assert_eq!(snap.log_position.event_count, 1);

        // The rebuild repaired the cache on disk.
        assert!(try_load(&ws).unwrap().is_some());
    }

    #[test]
    fn version_mismatch_treated_as_absent() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure_dir().unwrap();

        let mut snap = Snapshot::empty();
        snap.version = 99;
        save_atomic(&ws, &snap).unwrap();

        assert!(try_load(&ws).unwrap().is_none());
    }

    #[test]
    fn missing_snapshot_loads_as_none() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        assert!(try_load(&ws).unwrap().is_none());
    }

    #[test]
    fn save_atomic_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure_dir().unwrap();

        save_atomic(&ws, &Snapshot::empty()).unwrap();
        assert!(ws.snapshot_path().exists());
        assert!(!ws.snapshot_path().with_extension("json.tmp").exists());
    }

    #[test]
    fn snapshot_serde_roundtrip() {
        let snap = fold(
            &[
                register("a1", 1, t0(), &["f.txt"]),
                grant("a1", 2, t0(), "lock-1", "f.txt", 300),
            ],
            200,
        );
        let json = serde_json::to_string(&snap).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, back);
    }
}
