//! Core domain types shared across the coordination engine.

pub mod config;
pub mod hash;
pub mod ids;

pub use config::CoordConfig;
pub use hash::{ContentHash, NEW_FILE};
pub use ids::{AgentId, EventId, LockId, SessionId};
