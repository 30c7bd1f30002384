use std::{collections::HashSet, sync::Arc};

use chatcore_authz::CanSendDirect;
use chatcore_hub::Hub;
use chatcore_presence::PresenceQuery;
use chatcore_pubsub::ChatPublisher;
use tokio::sync::Mutex;

/// Everything `ChatHandler` needs: the hub to fan out locally, the authz
/// gate to clear direct messages, the pub/sub publisher to fan out
/// cross-instance, and this process's instance id for the envelope.
/// Kept separate from `PresenceContext` so a handler that never touches
/// presence queries can be unit-tested without standing up a
/// `PresenceService` (which requires a live connection store).
#[derive(Clone)]
pub struct ChatContext {
    pub hub: Arc<Hub>,
    pub authz: Arc<dyn CanSendDirect>,
    pub pubsub: Arc<dyn ChatPublisher>,
    pub instance_id: String,
}

/// Everything `PresenceHandler` needs.
#[derive(Clone)]
pub struct PresenceContext {
    pub presence: Arc<dyn PresenceQuery>,
}

/// The full context a connection's dispatch loop carries; built once at
/// connection setup and handed to whichever handler the inbound frame
/// routes to.
#[derive(Clone)]
pub struct RouterContext {
    pub chat: ChatContext,
    pub presence: PresenceContext,
}

/// The identity and per-connection state a handler needs: who is sending,
/// over which connection, and what presence subscriptions that connection
/// currently holds. `subscriptions` is owned by the connection (per §3) —
/// the router mutates it directly since it runs on the connection's own
/// read task; the hub only ever reads a shared view of it.
#[derive(Clone)]
pub struct ConnectionIdentity {
    pub user_id: i64,
    pub conn_id: i64,
    pub subscriptions: Arc<Mutex<HashSet<i64>>>,
}
