//! Agent Coord - filesystem-only coordination for concurrent coding agents.
//!
//! Multiple agent processes working in one project tree coordinate through an
//! append-only event log, advisory TTL locks, and compare-and-swap writes.
//! No daemon, no network: the filesystem is the whole transport.

pub mod coord;
pub mod health;
pub mod merge;
pub mod report;
pub mod store;
pub mod types;
