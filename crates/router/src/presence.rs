use chatcore_protocol::{PresenceCmd, PresenceCommand, WsMessage};
use tokio::sync::mpsc;
use tracing::warn;

use crate::context::{ConnectionIdentity, PresenceContext};

/// Decodes `{cmd, user_ids}` and dispatches: `subscribe`/`unsubscribe` mutate
/// the connection's own subscription set (owned by the connection, touched
/// only by its read task — this handler runs on that same task);
/// `get_online_friends` queries the presence service and enqueues a
/// response frame on the connection's own send channel.
pub async fn handle(
    payload: serde_json::Value,
    ctx: &PresenceContext,
    identity: &ConnectionIdentity,
    sender: &mpsc::Sender<String>,
) {
    let cmd: PresenceCommand = match serde_json::from_value(payload) {
        Ok(cmd) => cmd,
        Err(err) => {
            warn!(conn_id = identity.conn_id, %err, "malformed presence command, dropping");
            return;
        },
    };

    match cmd.cmd {
        PresenceCmd::Subscribe => apply_subscribe(identity, cmd.user_ids).await,
        PresenceCmd::Unsubscribe => apply_unsubscribe(identity, cmd.user_ids).await,
        PresenceCmd::GetOnlineFriends => {
            let online = ctx.presence.get_online_friends(&cmd.user_ids).await;
            let Ok(frame) = WsMessage::presence(serde_json::json!({ "online_friends": online })).encode() else {
                return;
            };
            let _ = sender.try_send(frame);
        },
    }
}

async fn apply_subscribe(identity: &ConnectionIdentity, user_ids: Vec<i64>) {
    identity.subscriptions.lock().await.extend(user_ids);
}

async fn apply_unsubscribe(identity: &ConnectionIdentity, user_ids: Vec<i64>) {
    let mut subs = identity.subscriptions.lock().await;
    for user_id in &user_ids {
        subs.remove(user_id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use tokio::sync::Mutex;

    use super::*;

    fn identity() -> ConnectionIdentity {
        ConnectionIdentity { user_id: 1, conn_id: 1, subscriptions: Arc::new(Mutex::new(HashSet::new())) }
    }

    #[tokio::test]
    async fn subscribe_adds_to_the_set() {
        let id = identity();
        apply_subscribe(&id, vec![2, 3]).await;
        assert_eq!(*id.subscriptions.lock().await, HashSet::from([2, 3]));
    }

    #[tokio::test]
    async fn unsubscribe_removes_only_the_named_ids() {
        let id = identity();
        apply_subscribe(&id, vec![2, 3, 4]).await;
        apply_unsubscribe(&id, vec![3]).await;
        assert_eq!(*id.subscriptions.lock().await, HashSet::from([2, 4]));
    }

    #[tokio::test]
    async fn unsubscribe_of_an_absent_id_is_a_no_op() {
        let id = identity();
        apply_subscribe(&id, vec![2]).await;
        apply_unsubscribe(&id, vec![99]).await;
        assert_eq!(*id.subscriptions.lock().await, HashSet::from([2]));
    }
}
