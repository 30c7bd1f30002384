//! Cross-instance fan-out over Redis pub/sub: every gateway instance
//! publishes chat events to the `chat.direct`/`chat.room` channels and
//! subscribes to both, so a message delivered on one instance reaches a
//! recipient connected to any other.

mod publisher;
mod transport;

pub use publisher::{ChatPublisher, RecordingPublisher};
pub use transport::{PubSubTransport, Subscription};
