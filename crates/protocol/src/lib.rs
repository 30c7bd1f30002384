//! Wire types shared between the chat instance and its clients/peers.
//!
//! Three wire surfaces:
//!
//! - [`wire`] — the WebSocket frame envelope and its typed payloads.
//! - [`presence`] — presence status/event types used internally between the
//!   presence service, its event bus, and the session hub, and exposed to
//!   clients as the server-originated presence broadcast.
//! - [`redis_envelope`] — the cross-instance pub/sub envelope.

pub mod constants;
pub mod presence;
pub mod redis_envelope;
pub mod wire;

pub use constants::*;
pub use presence::*;
pub use redis_envelope::*;
pub use wire::*;
