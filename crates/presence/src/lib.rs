//! The presence service and its in-process event bus: tracks which
//! connections a user currently holds open and fans out online/offline
//! transitions to interested subscribers.

pub mod bus;
pub mod recently_online;
pub mod service;

pub use bus::{PresenceEventBus, PresenceSubscription};
pub use recently_online::RecentlyOnline;
pub use service::{PermissiveDirectory, PresenceQuery, PresenceService, ProfileDirectory, StubPresenceQuery};
