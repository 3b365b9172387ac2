//! Human and machine renderings of a snapshot.
//!
//! The JSON form is the snapshot's own serde encoding; the human form is a
//! compact terminal summary. Both render from the same folded state so they
//! can never disagree.

use chrono::{DateTime, Utc};

use crate::store::snapshot::{AgentStatus, Snapshot};

/// The snapshot as pretty-printed JSON.
pub fn render_json(snapshot: &Snapshot) -> serde_json::Result<String> {
    serde_json::to_string_pretty(snapshot)
}

/// A terminal-friendly summary of the snapshot.
pub fn render_human(snapshot: &Snapshot) -> String {
    let now = Utc::now();
    let mut out = String::new();

    out.push_str(&format!(
        "Coordination status (as of {})\n",
        snapshot.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!(
        "  {} event(s) folded, last id {}\n",
        snapshot.log_position.event_count,
        snapshot
            .log_position
            .last_event_id
            .as_ref()
            .map(|id| id.as_str())
            .unwrap_or("-"),
    ));

    out.push_str(&format!("\nAgents ({}):\n", snapshot.agents.len()));
    if snapshot.agents.is_empty() {
        out.push_str("  none\n");
    }
    let mut agents: Vec<_> = snapshot.agents.iter().collect();
    agents.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
    for (id, state) in agents {
        let status = match state.status {
            AgentStatus::Active => "active",
            AgentStatus::Completed => "completed",
        };
        out.push_str(&format!(
            "  {:<16} {:<10} last seen {:>4} ago  {}\n",
            id.as_str(),
            status,
            age(now, state.last_seen),
            state.task_summary,
        ));
    }

    out.push_str(&format!("\nLocks ({}):\n", snapshot.locks.len()));
    if snapshot.locks.is_empty() {
        out.push_str("  none\n");
    }
    let mut locks: Vec<_> = snapshot.locks.values().collect();
    locks.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    for lock in locks {
        let state = if lock.is_expired_at(now) {
            "EXPIRED"
        } else {
            "held"
        };
        out.push_str(&format!(
            "  {:<24} {:<8} by {:<16} expires {}\n",
            lock.file_path,
            state,
            lock.owner_agent.as_str(),
            lock.expires_at.format("%H:%M:%S"),
        ));
    }

    out.push_str(&format!("\nFiles ({}):\n", snapshot.files.len()));
    if snapshot.files.is_empty() {
        out.push_str("  none\n");
    }
    let mut files: Vec<_> = snapshot.files.iter().collect();
    files.sort_by(|a, b| a.0.cmp(b.0));
    for (path, state) in files {
        out.push_str(&format!(
            "  {:<24} hash {:<10} last writer {}\n",
            path,
            state.last_hash.as_ref().map(|h| h.short()).unwrap_or("-"),
            state
                .last_writer
                .as_ref()
                .map(|a| a.as_str())
                .unwrap_or("-"),
        ));
    }

    out.push_str(&format!(
        "\nTotals: {} event(s), {} successful write(s), {} conflict(s)\n",
        snapshot.stats.total_events,
        snapshot.stats.total_successful_writes,
        snapshot.stats.total_conflicts,
    ));

    out
}

fn age(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h", secs / 3600)
    }
}
