//! Workspace health checks and repair.
//!
//! Each check inspects one failure mode the coordination layer can get into
//! (missing directory, unwritable log, corrupt snapshot, abandoned meta-lock)
//! and knows the one deterministic repair for it. Running with `fix` applies
//! the repairs and reports the state afterwards, so a clean report means the
//! workspace really is clean now, not that it used to be.
//!
//! Repairs never touch log content. A log with unparseable lines is reported
//! and tolerated; rewriting history is not a repair.

use std::fs::OpenOptions;
use std::io;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::coord::heartbeat::{self, HeartbeatError};
use crate::store::log::{self, EventStoreError};
use crate::store::rotation::{self, RotationError};
use crate::store::snapshot::{self, SnapshotError};
use crate::store::workspace::Workspace;
use crate::types::{AgentId, CoordConfig, SessionId};

/// A meta-lock directory older than this is presumed abandoned by a crashed
/// holder. Normal holds last milliseconds.
pub const STUCK_META_LOCK_AGE: Duration = Duration::from_secs(300);

/// Errors from running health checks.
#[derive(Debug, Error)]
pub enum HealthError {
    /// IO error inspecting the workspace.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot fold failed during a check or repair.
    #[error("snapshot: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Event append failed during a repair.
    #[error("event store: {0}")]
    Store(#[from] EventStoreError),

    /// Rotation repair failed.
    #[error("rotation: {0}")]
    Rotation(#[from] RotationError),

    /// Stale-lock cleanup failed.
    #[error("heartbeat: {0}")]
    Heartbeat(#[from] HeartbeatError),
}

/// Result type for health operations.
pub type Result<T> = std::result::Result<T, HealthError>;

/// Severity of one check's finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    /// Degraded but operable.
    Warn,
    /// Broken; coordination operations will misbehave.
    Fail,
    /// Unusable; no coordination is possible at all.
    Critical,
}

/// Aggregate verdict over all checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
    Healthy,
    Unhealthy,
    Critical,
}

/// One check's outcome.
#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

/// Full health report, post-repair when repairs ran.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub overall: OverallHealth,
    pub checks: Vec<Check>,
    /// Repairs applied, in order. Empty when `fix` was off or nothing needed
    /// fixing.
    pub fixed: Vec<String>,
}

impl HealthReport {
    /// Human-oriented detail lines for everything that is not passing.
    pub fn issues(&self) -> Vec<&Check> {
        self.checks
            .iter()
            .filter(|c| c.status != CheckStatus::Pass)
            .collect()
    }

    /// Process exit code convention: 0 healthy, 1 unhealthy, 2 critical.
    pub fn exit_code(&self) -> i32 {
        match self.overall {
            OverallHealth::Healthy => 0,
            OverallHealth::Unhealthy => 1,
            OverallHealth::Critical => 2,
        }
    }
}

/// Runs all checks; with `fix` set, applies repairs first and reports the
/// state after them.
pub fn run(ws: &Workspace, config: &CoordConfig, fix: bool) -> Result<HealthReport> {
    let mut fixed = Vec::new();

    if fix {
        let before = run_checks(ws, config)?;
        for check in &before {
            if check.status != CheckStatus::Pass {
                if let Some(action) = repair(ws, config, check.name)? {
                    info!(check = check.name, action = %action, "applied repair");
                    fixed.push(action);
                }
            }
        }
    }

    let checks = run_checks(ws, config)?;
    let overall = aggregate(&checks);

    for check in &checks {
        if check.status != CheckStatus::Pass {
            warn!(check = check.name, status = ?check.status, detail = %check.detail, "health issue");
        }
    }

    Ok(HealthReport {
        overall,
        checks,
        fixed,
    })
}

fn aggregate(checks: &[Check]) -> OverallHealth {
    let worst = checks
        .iter()
        .map(|c| c.status)
        .max()
        .unwrap_or(CheckStatus::Pass);
    match worst {
        CheckStatus::Pass => OverallHealth::Healthy,
        CheckStatus::Warn | CheckStatus::Fail => OverallHealth::Unhealthy,
        CheckStatus::Critical => OverallHealth::Critical,
    }
}

fn run_checks(ws: &Workspace, config: &CoordConfig) -> Result<Vec<Check>> {
    let mut checks = Vec::new();

    // Everything else is meaningless without the directory, so short-circuit.
    let dir = check_directory(ws);
    let usable = dir.status != CheckStatus::Critical && ws.dir().is_dir();
    checks.push(dir);
    if !usable {
        return Ok(checks);
    }

    checks.push(check_log_writable(ws));
    checks.push(check_log_parses(ws)?);
    checks.push(check_snapshot(ws)?);
    checks.push(check_log_size(ws, config)?);
    checks.push(check_stale_locks(ws, config)?);
    checks.push(check_meta_lock(ws)?);

    Ok(checks)
}

fn repair(ws: &Workspace, config: &CoordConfig, check_name: &'static str) -> Result<Option<String>> {
    let action = match check_name {
        "directory" => {
            if !ws.project_root().is_dir() {
                // A missing project is not ours to invent.
                return Ok(None);
            }
            ws.ensure_dir()?;
            "created coordination directory".to_string()
        }
        "log_writable" => {
            let path = ws.log_path();
            if path.exists() {
                let mut perms = std::fs::metadata(&path)?.permissions();
                perms.set_readonly(false);
                std::fs::set_permissions(&path, perms)?;
                "cleared read-only flag on log".to_string()
            } else {
                return Ok(None);
            }
        }
        // Unparseable lines are tolerated, never rewritten.
        "log_parses" => return Ok(None),
        "snapshot" => {
            snapshot::rebuild(ws, true)?;
            "rebuilt snapshot from log".to_string()
        }
        "log_size" => {
            rotation::check_and_rotate(ws, config.max_events, config.keep_rotated, true)?;
            "rotated oversized log".to_string()
        }
        "stale_locks" => {
            let agent = AgentId::new("health-check");
            let session = SessionId::new("health-check");
            let report =
                heartbeat::check_stale(ws, &agent, &session, config.stale_threshold_sec, true)?;
            if report.released_locks.is_empty() {
                // Expired locks with live owners clear on next acquisition.
                return Ok(None);
            }
            format!("released {} stale lock(s)", report.released_locks.len())
        }
        "meta_lock" => {
            std::fs::remove_dir(ws.meta_lock_path())?;
            "removed abandoned log lock".to_string()
        }
        _ => return Ok(None),
    };
    Ok(Some(action))
}

fn check_directory(ws: &Workspace) -> Check {
    let (status, detail) = if !ws.project_root().is_dir() {
        (
            CheckStatus::Critical,
            format!("project root missing: {}", ws.project_root().display()),
        )
    } else if !ws.dir().is_dir() {
        (
            CheckStatus::Fail,
            format!("coordination directory missing: {}", ws.dir().display()),
        )
    } else {
        (CheckStatus::Pass, "coordination directory present".into())
    };
    Check {
        name: "directory",
        status,
        detail,
    }
}

fn check_log_writable(ws: &Workspace) -> Check {
    // Open without `create`: a read-only health run must not leave an
    // empty log behind.
    let path = ws.log_path();
    let (status, detail) = if !path.exists() {
        (CheckStatus::Pass, "no log yet; first append creates it".into())
    } else {
        match OpenOptions::new().append(true).open(&path) {
            Ok(_) => (CheckStatus::Pass, "log is writable".into()),
            Err(e) => (
                CheckStatus::Fail,
                format!("cannot open log for append: {}", e),
            ),
        }
    };
    Check {
        name: "log_writable",
        status,
        detail,
    }
}

fn check_log_parses(ws: &Workspace) -> Result<Check> {
    let (events, skipped) = log::live_events(ws)?;
    let (status, detail) = if skipped == 0 {
        (
            CheckStatus::Pass,
            format!("{} event(s), all parseable", events.len()),
        )
    } else {
        (
            CheckStatus::Warn,
            format!("{} unparseable line(s) among {} event(s)", skipped, events.len()),
        )
    };
    Ok(Check {
        name: "log_parses",
        status,
        detail,
    })
}

fn check_snapshot(ws: &Workspace) -> Result<Check> {
    let log_len = log::log_len(ws)?;
    let (status, detail) = match snapshot::try_load(ws)? {
        Some(snap) if snap.log_position.byte_offset == log_len => {
            (CheckStatus::Pass, "snapshot current".into())
        }
        Some(snap) => (
            CheckStatus::Warn,
            format!(
                "snapshot behind log ({} of {} bytes)",
                snap.log_position.byte_offset, log_len
            ),
        ),
        None if log_len == 0 => (CheckStatus::Pass, "no snapshot, empty log".into()),
        None => (
            CheckStatus::Warn,
            "snapshot missing or unreadable with a non-empty log".into(),
        ),
    };
    Ok(Check {
        name: "snapshot",
        status,
        detail,
    })
}

fn check_log_size(ws: &Workspace, config: &CoordConfig) -> Result<Check> {
    let count = log::event_count(ws)?;
    let (status, detail) = if count < config.max_events {
        (
            CheckStatus::Pass,
            format!("{} of {} events before rotation", count, config.max_events),
        )
    } else {
        (
            CheckStatus::Warn,
            format!("log holds {} events, rotation due at {}", count, config.max_events),
        )
    };
    Ok(Check {
        name: "log_size",
        status,
        detail,
    })
}

fn check_stale_locks(ws: &Workspace, config: &CoordConfig) -> Result<Check> {
    // Fold in memory; checks must not rewrite the cached snapshot.
    let (events, _) = log::live_events(ws)?;
    let snap = snapshot::fold(&events, log::log_len(ws)?);
    let now = Utc::now();

    let stale_agents = snap.stale_agents(now, config.stale_threshold_sec);
    let held_by_stale = snap
        .locks
        .values()
        .filter(|l| stale_agents.iter().any(|a| **a == l.owner_agent))
        .count();
    let expired = snap.locks.values().filter(|l| l.is_expired_at(now)).count();

    let (status, detail) = if held_by_stale == 0 && expired == 0 {
        (
            CheckStatus::Pass,
            format!("{} live lock(s)", snap.locks.len()),
        )
    } else {
        (
            CheckStatus::Warn,
            format!(
                "{} lock(s) held by stale agents, {} expired",
                held_by_stale, expired
            ),
        )
    };
    Ok(Check {
        name: "stale_locks",
        status,
        detail,
    })
}

fn check_meta_lock(ws: &Workspace) -> Result<Check> {
    let path = ws.meta_lock_path();
    let (status, detail) = if !path.exists() {
        (CheckStatus::Pass, "no lock held".into())
    } else {
        let age = std::fs::metadata(&path)?
            .modified()?
            .elapsed()
            .unwrap_or_default();
        if age >= STUCK_META_LOCK_AGE {
            (
                CheckStatus::Fail,
                format!("log lock held for {}s, presumed abandoned", age.as_secs()),
            )
        } else {
            (CheckStatus::Pass, "lock held briefly by a live writer".into())
        }
    };
    Ok(Check {
        name: "meta_lock",
        status,
        detail,
    })
}
