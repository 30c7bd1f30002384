//! Shared error type, context plumbing, and logging setup used across the
//! chatcore crates.

pub mod error;
pub mod logging;

pub use error::{ChatCoreError, Context, ErrorKind, Result};
