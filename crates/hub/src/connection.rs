use std::{collections::HashSet, sync::Arc};

use tokio::sync::{Mutex, mpsc};

/// A non-owning handle the hub uses to reach one live WS connection: a
/// bounded sender for outbound frames and a shared view of the connection's
/// presence subscription set (owned by the connection itself, per §3 —
/// the hub only ever reads it, to decide presence fan-out).
#[derive(Clone)]
pub struct HubConnection {
    pub conn_id: i64,
    pub user_id: i64,
    sender: mpsc::Sender<String>,
    subscriptions: Arc<Mutex<HashSet<i64>>>,
}

impl HubConnection {
    #[must_use]
    pub fn new(
        conn_id: i64,
        user_id: i64,
        sender: mpsc::Sender<String>,
        subscriptions: Arc<Mutex<HashSet<i64>>>,
    ) -> Self {
        Self { conn_id, user_id, sender, subscriptions }
    }

    /// Non-blocking send; a full queue drops the frame for this connection
    /// only, never stalls the caller.
    pub fn try_send(&self, frame: &str) -> bool {
        self.sender.try_send(frame.to_string()).is_ok()
    }

    pub async fn is_subscribed_to(&self, user_id: i64) -> bool {
        self.subscriptions.lock().await.contains(&user_id)
    }
}
