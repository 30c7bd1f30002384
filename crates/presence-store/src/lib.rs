//! The Redis-backed connection ledger.
//!
//! Every multi-key mutation (`AddConnection`, `RemoveConnection`,
//! `TouchConnection`, `CleanupDanglingConnections`) runs as a single
//! server-side Lua script so the connection hash and the user's connection
//! set never observe an interleaved, half-applied state.

mod scripts;
mod store;

pub use store::{PresenceStore, TouchOutcome};
