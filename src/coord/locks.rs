//! Advisory file locks with TTL.
//!
//! A lock is nothing but a granted `lock_acquire` event in the log; holding
//! one is a claim other cooperating agents respect, not an enforcement
//! mechanism. Every lock carries a TTL so a crashed holder can never block a
//! path forever: an expired lock is taken over by the next acquirer without
//! any release event from the dead owner.
//!
//! Contended acquisition retries with exponential backoff and jitter rather
//! than spinning on the log.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

use crate::store::event::{AcquireOutcome, CoordEventPayload, ReleaseOutcome};
use crate::store::log::EventStoreError;
use crate::store::snapshot::{self, SnapshotError};
use crate::store::workspace::Workspace;
use crate::types::{AgentId, CoordConfig, LockId, SessionId};

/// Errors from lock operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Failed to append the lock event.
    #[error("event store: {0}")]
    Store(#[from] EventStoreError),

    /// Failed to fold the snapshot.
    #[error("snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Result type for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;

/// Retry schedule for contended acquisition.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound on any single delay, before jitter.
    pub cap: Duration,
    /// Total acquisition attempts before giving up.
    pub max_attempts: u32,
    /// Fraction of the delay added as random jitter (0.3 means up to +30%).
    pub jitter_frac: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            base: Duration::from_secs(5),
            cap: Duration::from_secs(120),
            max_attempts: 5,
            jitter_frac: 0.3,
        }
    }
}

impl BackoffPolicy {
    /// Delay to sleep after the given 0-based failed attempt.
    pub fn delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let exp = self.base.as_secs_f64() * 2f64.powi(attempt as i32);
        let capped = exp.min(self.cap.as_secs_f64());
        let jitter = 1.0 + rng.gen_range(0.0..=self.jitter_frac);
        Duration::from_secs_f64(capped * jitter)
    }
}

/// Knobs for one acquisition attempt.
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    /// Lock lifetime in seconds.
    pub ttl_sec: u64,
    /// Give up immediately instead of waiting out contention.
    pub no_wait: bool,
    pub backoff: BackoffPolicy,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        AcquireOptions {
            ttl_sec: CoordConfig::default().ttl_sec,
            no_wait: false,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Outcome of an acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    /// The lock is now held by the requesting agent.
    Granted {
        lock_id: LockId,
        expires_at: chrono::DateTime<chrono::Utc>,
    },
    /// Another agent holds an unexpired lock and `no_wait` was set.
    Blocked {
        owner: AgentId,
        expires_at: chrono::DateTime<chrono::Utc>,
    },
    /// Contention outlasted the whole backoff schedule.
    TimedOut { attempts: u32 },
}

/// Outcome of a release attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseResult {
    /// The lock was released (forcibly or by its owner).
    Released { forced: bool },
    /// No live lock with that ID exists.
    NotFound,
    /// The caller does not own the lock and did not force.
    NotAuthorized { owner: AgentId },
}

/// Attempts to acquire a lock on `path` for `agent_id`.
///
/// Grants immediately when the path is unlocked, the existing lock has
/// expired, or the caller already owns it (re-acquisition refreshes the TTL
/// under a fresh lock ID). Otherwise waits out the backoff schedule unless
/// `no_wait` is set.
pub fn acquire(
    ws: &Workspace,
    agent_id: &AgentId,
    session_id: &SessionId,
    path: &str,
    opts: &AcquireOptions,
) -> Result<Acquisition> {
    let mut rng = rand::thread_rng();

    for attempt in 0..opts.backoff.max_attempts {
        let snap = snapshot::rebuild(ws, false)?;
        let now = Utc::now();

        let holder = snap.lock_on_path(path).filter(|lock| {
            !lock.is_expired_at(now) && lock.owner_agent != *agent_id
        });

        match holder {
            None => {
                if let Some(prior) = snap.lock_on_path(path) {
                    if prior.is_expired_at(now) && prior.owner_agent != *agent_id {
                        info!(
                            path,
                            prior_owner = %prior.owner_agent,
                            "taking over expired lock"
                        );
                    }
                }
                return grant(ws, agent_id, session_id, path, opts.ttl_sec);
            }
            Some(lock) => {
                if opts.no_wait {
                    return Ok(Acquisition::Blocked {
                        owner: lock.owner_agent.clone(),
                        expires_at: lock.expires_at,
                    });
                }
                if attempt + 1 < opts.backoff.max_attempts {
                    let delay = opts.backoff.delay(attempt, &mut rng);
                    debug!(
                        path,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        owner = %lock.owner_agent,
                        "lock contended, backing off"
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }

    Ok(Acquisition::TimedOut {
        attempts: opts.backoff.max_attempts,
    })
}

fn grant(
    ws: &Workspace,
    agent_id: &AgentId,
    session_id: &SessionId,
    path: &str,
    ttl_sec: u64,
) -> Result<Acquisition> {
    // Wire timestamps are millisecond precision.
    let now = crate::store::event::now_ms();
    let lock_id = LockId::generate(now);
    let expires_at = now + chrono::Duration::seconds(ttl_sec as i64);

    crate::store::log::append(
        ws,
        agent_id,
        session_id,
        CoordEventPayload::LockAcquire {
            lock_id: lock_id.clone(),
            path: path.to_string(),
            outcome: AcquireOutcome::Granted,
            acquired_at: now,
            expires_at,
            ttl_sec,
        },
    )?;
    snapshot::rebuild(ws, true)?;

    Ok(Acquisition::Granted {
        lock_id,
        expires_at,
    })
}

/// Releases a lock by ID.
///
/// Only the owner may release unless `force` is set; forced releases are
/// recorded with a distinct outcome so the log shows who cleaned up after
/// whom.
pub fn release(
    ws: &Workspace,
    agent_id: &AgentId,
    session_id: &SessionId,
    lock_id: &LockId,
    force: bool,
) -> Result<ReleaseResult> {
    let snap = snapshot::rebuild(ws, false)?;

    let Some(lock) = snap.locks.get(lock_id) else {
        return Ok(ReleaseResult::NotFound);
    };

    let owned = lock.owner_agent == *agent_id;
    if !owned && !force {
        return Ok(ReleaseResult::NotAuthorized {
            owner: lock.owner_agent.clone(),
        });
    }

    let outcome = if owned {
        ReleaseOutcome::Released
    } else {
        info!(lock_id = %lock_id, owner = %lock.owner_agent, "force-releasing lock");
        ReleaseOutcome::ForceReleased
    };

    crate::store::log::append(
        ws,
        agent_id,
        session_id,
        CoordEventPayload::LockRelease {
            lock_id: lock_id.clone(),
            outcome,
        },
    )?;
    snapshot::rebuild(ws, true)?;

    Ok(ReleaseResult::Released { forced: !owned })
}
