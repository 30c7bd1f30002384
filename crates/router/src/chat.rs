use chatcore_protocol::{
    CHANNEL_CHAT_DIRECT, CHANNEL_CHAT_ROOM, ChatCommand, ChatKind, ChatRejection, DirectEventData, RedisEvent,
    RoomAction, RoomEventData, WsMessage,
};
use tokio::sync::mpsc;
use tracing::warn;

use crate::context::{ChatContext, ConnectionIdentity};

/// Decodes `{kind, to_user_id?, room_id?, text, action?}` and dispatches to
/// the direct-message or room path.
pub async fn handle(
    payload: serde_json::Value,
    ctx: &ChatContext,
    identity: &ConnectionIdentity,
    sender: &mpsc::Sender<String>,
) {
    let cmd: ChatCommand = match serde_json::from_value(payload) {
        Ok(cmd) => cmd,
        Err(err) => {
            warn!(conn_id = identity.conn_id, %err, "malformed chat command, dropping");
            return;
        },
    };

    match cmd.kind {
        ChatKind::Direct => handle_direct(cmd, ctx, identity, sender).await,
        ChatKind::Room => handle_room(cmd, ctx, identity).await,
    }
}

async fn handle_direct(cmd: ChatCommand, ctx: &ChatContext, identity: &ConnectionIdentity, sender: &mpsc::Sender<String>) {
    let Some(to_user_id) = cmd.to_user_id else {
        warn!(conn_id = identity.conn_id, "direct chat command missing to_user_id, dropping");
        return;
    };

    // Authz gate failures surface as Internal, never as a silent denial —
    // but the sender still needs *something* back, so it gets a rejection
    // frame distinguishable from an ordinary block/not-friends denial.
    let decision = match ctx.authz.can_send_direct(identity.user_id, to_user_id).await {
        Ok(decision) => decision,
        Err(err) => {
            warn!(conn_id = identity.conn_id, to_user_id, %err, "authz gate unavailable, rejecting direct message");
            send_rejection(sender, "internal", Some(to_user_id));
            return;
        },
    };

    if !decision.allowed() {
        send_rejection(sender, decision.reason(), Some(to_user_id));
        return;
    }

    let data = DirectEventData { to_user_id, from_user_id: identity.user_id, text: cmd.text };
    let Ok(frame) = WsMessage::chat(serde_json::to_value(&data).unwrap_or(serde_json::Value::Null)).encode() else {
        return;
    };

    // Fan out locally first, then publish for peer instances — matching
    // §4.5's ordering so a single-instance deployment never depends on the
    // broker round-trip to deliver its own local sessions.
    ctx.hub.send_to_user(to_user_id, &frame).await;

    let envelope =
        RedisEvent::new("direct", ctx.instance_id.clone(), serde_json::to_value(&data).unwrap_or(serde_json::Value::Null));
    if let Err(err) = ctx.pubsub.publish(CHANNEL_CHAT_DIRECT, &envelope).await {
        warn!(%err, "failed to publish direct chat envelope; peer instances will miss this message");
    }
}

async fn handle_room(cmd: ChatCommand, ctx: &ChatContext, identity: &ConnectionIdentity) {
    let Some(room_id) = cmd.room_id else {
        warn!(conn_id = identity.conn_id, "room chat command missing room_id, dropping");
        return;
    };

    match cmd.action {
        Some(RoomAction::Join) => ctx.hub.join_room(identity.conn_id, room_id).await,
        Some(RoomAction::Leave) => ctx.hub.leave_room(identity.conn_id, room_id).await,
        None => {
            let data = RoomEventData { room_id, from_user_id: identity.user_id, text: cmd.text };
            let Ok(frame) = WsMessage::chat(serde_json::to_value(&data).unwrap_or(serde_json::Value::Null)).encode()
            else {
                return;
            };
            ctx.hub.broadcast_to_room(room_id, &frame).await;

            let envelope = RedisEvent::new(
                "room",
                ctx.instance_id.clone(),
                serde_json::to_value(&data).unwrap_or(serde_json::Value::Null),
            );
            if let Err(err) = ctx.pubsub.publish(CHANNEL_CHAT_ROOM, &envelope).await {
                warn!(%err, "failed to publish room chat envelope; peer instances will miss this message");
            }
        },
    }
}

/// Pushed back to the sender's own connection, never broadcast — §4.7
/// requires the handler to "signal the sender", not the recipient.
fn send_rejection(sender: &mpsc::Sender<String>, reason: &str, to_user_id: Option<i64>) {
    let rejection = ChatRejection::new(reason, to_user_id);
    let Ok(frame) = WsMessage::chat(serde_json::to_value(&rejection).unwrap_or(serde_json::Value::Null)).encode()
    else {
        return;
    };
    let _ = sender.try_send(frame);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use chatcore_authz::AlwaysAllow;
    use chatcore_hub::{Hub, HubConnection};
    use chatcore_pubsub::RecordingPublisher;
    use tokio::sync::{Mutex, mpsc};

    use super::*;

    struct DenyAll(chatcore_authz::DirectMessageDecision);

    #[async_trait::async_trait]
    impl chatcore_authz::CanSendDirect for DenyAll {
        async fn can_send_direct(&self, _from: i64, _to: i64) -> chatcore_common::Result<chatcore_authz::DirectMessageDecision> {
            Ok(self.0)
        }
    }

    async fn ctx_with_authz(authz: Arc<dyn chatcore_authz::CanSendDirect>) -> (ChatContext, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::new());
        let ctx = ChatContext {
            hub: Arc::new(Hub::new("instance-a")),
            authz,
            pubsub: publisher.clone() as Arc<dyn chatcore_pubsub::ChatPublisher>,
            instance_id: "instance-a".to_string(),
        };
        (ctx, publisher)
    }

    fn identity(user_id: i64, conn_id: i64) -> ConnectionIdentity {
        ConnectionIdentity { user_id, conn_id, subscriptions: Arc::new(Mutex::new(HashSet::new())) }
    }

    #[tokio::test]
    async fn allowed_direct_message_fans_out_locally_and_publishes() {
        let (ctx, publisher) = ctx_with_authz(Arc::new(AlwaysAllow)).await;
        let (recipient_tx, mut recipient_rx) = mpsc::channel(8);
        let recipient = HubConnection::new(2, 7, recipient_tx, Arc::new(Mutex::new(HashSet::new())));
        ctx.hub.register(recipient).await;

        let (sender_tx, mut sender_rx) = mpsc::channel(8);
        let sender = identity(3, 1);

        handle(
            serde_json::json!({"kind": "direct", "to_user_id": 7, "text": "hi"}),
            &ctx,
            &sender,
            &sender_tx,
        )
        .await;

        let delivered = recipient_rx.recv().await.expect("recipient gets the frame");
        assert!(delivered.contains("\"to_user_id\":7"));
        assert!(delivered.contains("\"from_user_id\":3"));

        assert_eq!(publisher.published().await.len(), 1);
        assert!(sender_rx.try_recv().is_err(), "sender gets nothing on success");
    }

    #[tokio::test]
    async fn blocked_direct_message_rejects_sender_and_never_publishes() {
        let (ctx, publisher) = ctx_with_authz(Arc::new(DenyAll(chatcore_authz::DirectMessageDecision::Blocked))).await;
        let (sender_tx, mut sender_rx) = mpsc::channel(8);
        let sender = identity(3, 1);

        handle(
            serde_json::json!({"kind": "direct", "to_user_id": 7, "text": "hi"}),
            &ctx,
            &sender,
            &sender_tx,
        )
        .await;

        let rejection = sender_rx.recv().await.expect("sender is signalled");
        assert!(rejection.contains("\"reason\":\"blocked\""));
        assert!(publisher.published().await.is_empty());
    }

    #[tokio::test]
    async fn room_broadcast_reaches_every_member_including_sender() {
        let (ctx, publisher) = ctx_with_authz(Arc::new(AlwaysAllow)).await;
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        ctx.hub.register(HubConnection::new(1, 1, tx1, Arc::new(Mutex::new(HashSet::new())))).await;
        ctx.hub.register(HubConnection::new(2, 2, tx2, Arc::new(Mutex::new(HashSet::new())))).await;
        ctx.hub.join_room(1, 10).await;
        ctx.hub.join_room(2, 10).await;

        let (sender_tx, _sender_rx) = mpsc::channel(8);
        let sender = identity(1, 1);
        handle(
            serde_json::json!({"kind": "room", "room_id": 10, "text": "hello"}),
            &ctx,
            &sender,
            &sender_tx,
        )
        .await;

        assert!(rx1.recv().await.unwrap().contains("hello"));
        assert!(rx2.recv().await.unwrap().contains("hello"));
        assert_eq!(publisher.published().await.len(), 1);
    }

    #[tokio::test]
    async fn join_then_leave_room_removes_membership() {
        let (ctx, _publisher) = ctx_with_authz(Arc::new(AlwaysAllow)).await;
        let (tx, _rx) = mpsc::channel(8);
        ctx.hub.register(HubConnection::new(1, 1, tx, Arc::new(Mutex::new(HashSet::new())))).await;

        let (sender_tx, _sender_rx) = mpsc::channel(8);
        let sender = identity(1, 1);
        handle(serde_json::json!({"kind": "room", "room_id": 10, "action": "join"}), &ctx, &sender, &sender_tx).await;
        assert_eq!(ctx.hub.room_member_count(10).await, 1);

        handle(serde_json::json!({"kind": "room", "room_id": 10, "action": "leave"}), &ctx, &sender, &sender_tx).await;
        assert_eq!(ctx.hub.room_member_count(10).await, 0);
    }
}
