//! Coordination configuration.
//!
//! The surrounding tooling loads these values from its own configuration
//! surface and passes them in; every knob has a built-in default so the core
//! works standalone.

use serde::{Deserialize, Serialize};

/// Tunable parameters for one project's coordination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordConfig {
    /// Lock time-to-live in seconds. A lock past `acquired_at + ttl_sec` is
    /// logically dead even without an explicit release.
    /// Default: 300.
    pub ttl_sec: u64,

    /// Event-count threshold that triggers log rotation.
    /// Default: 1000.
    pub max_events: u64,

    /// Seconds without any event from an agent before it is considered stale.
    /// Default: 120.
    pub stale_threshold_sec: u64,

    /// Number of rotated log generations to retain.
    /// Default: 1.
    pub keep_rotated: u32,
}

impl Default for CoordConfig {
    fn default() -> Self {
        CoordConfig {
            ttl_sec: 300,
            max_events: 1000,
            stale_threshold_sec: 120,
            keep_rotated: 1,
        }
    }
}
