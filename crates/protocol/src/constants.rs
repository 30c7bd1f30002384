use std::time::Duration;

/// Write deadline for a single WS frame or ping.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);
/// A connection is torn down if no pong arrives within this window.
pub const PONG_WAIT: Duration = Duration::from_secs(60);
/// Ping cadence, `0.9 * PONG_WAIT`.
pub const PING_PERIOD: Duration = Duration::from_secs(54);
/// Maximum inbound WS frame size.
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024;

/// Per-connection outbound send queue depth.
pub const SEND_CHANNEL_CAPACITY: usize = 256;
/// Per-subscriber presence event queue depth.
pub const PRESENCE_SUB_CAPACITY: usize = 16;
/// Pub/sub-to-hub bridge queue depth.
pub const PUBSUB_CHANNEL_CAPACITY: usize = 32;

/// Hard cap on a bulk presence lookup — requests above this are truncated.
pub const BULK_PRESENCE_CAP: usize = 1000;

/// Timeout applied to every outbound RPC (profile service, Redis).
pub const RPC_TIMEOUT: Duration = Duration::from_secs(4);

/// Protocol version carried in the `chat.direct`/`chat.room` pub/sub channel names.
pub const CHANNEL_CHAT_DIRECT: &str = "chat.direct";
pub const CHANNEL_CHAT_ROOM: &str = "chat.room";
