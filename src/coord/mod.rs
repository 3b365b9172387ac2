//! Agent-facing coordination operations.
//!
//! Everything here is sugar over the event store: acquiring a lock, beating a
//! heartbeat, and committing a write all reduce to "fold the snapshot, decide,
//! append an event". No state lives anywhere but the log.

pub mod cas;
pub mod heartbeat;
pub mod locks;

pub use cas::{CasError, ReadCapture, WriteOutcome};
pub use heartbeat::{HeartbeatError, StaleReport};
pub use locks::{AcquireOptions, Acquisition, BackoffPolicy, LockError, ReleaseResult};
