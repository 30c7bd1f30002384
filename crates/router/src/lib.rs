//! Decodes an inbound WS frame's envelope and routes its payload to the
//! presence or chat handler. Runs on the connection's own read task, so a
//! handler that mutates `ConnectionIdentity.subscriptions` needs no extra
//! synchronization against anything but the hub's read-only view of it.

mod chat;
mod context;
mod presence;

pub use context::{ChatContext, ConnectionIdentity, PresenceContext, RouterContext};

use chatcore_protocol::{WsMessage, WsMessageType};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Decodes one text frame and dispatches it. `Ping` is answered by the
/// connection's own liveness loop, not here; `System` frames from a client
/// carry nothing actionable today.
pub async fn dispatch(raw: &str, ctx: &RouterContext, identity: &ConnectionIdentity, sender: &mpsc::Sender<String>) {
    let msg = match WsMessage::decode(raw) {
        Ok(msg) => msg,
        Err(err) => {
            warn!(conn_id = identity.conn_id, %err, "malformed frame, dropping");
            return;
        },
    };

    match msg.r#type {
        WsMessageType::Chat => chat::handle(msg.payload, &ctx.chat, identity, sender).await,
        WsMessageType::Presence => presence::handle(msg.payload, &ctx.presence, identity, sender).await,
        WsMessageType::Ping | WsMessageType::System => {
            debug!(conn_id = identity.conn_id, kind = ?msg.r#type, "ignoring client-sent frame");
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use chatcore_authz::AlwaysAllow;
    use chatcore_hub::Hub;
    use chatcore_presence::StubPresenceQuery;
    use chatcore_pubsub::RecordingPublisher;
    use tokio::sync::{Mutex, mpsc};

    use super::*;

    fn router_ctx() -> RouterContext {
        RouterContext {
            chat: ChatContext {
                hub: Arc::new(Hub::new("instance-a")),
                authz: Arc::new(AlwaysAllow),
                pubsub: Arc::new(RecordingPublisher::new()),
                instance_id: "instance-a".to_string(),
            },
            presence: PresenceContext { presence: Arc::new(StubPresenceQuery { online: Vec::new() }) },
        }
    }

    fn identity() -> ConnectionIdentity {
        ConnectionIdentity { user_id: 1, conn_id: 1, subscriptions: Arc::new(Mutex::new(HashSet::new())) }
    }

    #[tokio::test]
    async fn unknown_frame_type_does_not_panic() {
        let ctx = router_ctx();
        let id = identity();
        let (tx, _rx) = mpsc::channel(4);
        dispatch(r#"{"type":"ping","payload":null}"#, &ctx, &id, &tx).await;
    }

    #[tokio::test]
    async fn garbage_input_is_dropped_quietly() {
        let ctx = router_ctx();
        let id = identity();
        let (tx, _rx) = mpsc::channel(4);
        dispatch("not a json frame", &ctx, &id, &tx).await;
    }

    #[tokio::test]
    async fn presence_frame_routes_to_the_presence_handler() {
        let ctx = router_ctx();
        let id = identity();
        let (tx, _rx) = mpsc::channel(4);
        dispatch(r#"{"type":"presence","payload":{"cmd":"subscribe","user_ids":[9]}}"#, &ctx, &id, &tx).await;
        assert!(id.subscriptions.lock().await.contains(&9));
    }
}
