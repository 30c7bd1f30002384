use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicBool, Ordering},
};

use chatcore_presence::PresenceSubscription;
use chatcore_protocol::{
    CHANNEL_CHAT_DIRECT, CHANNEL_CHAT_ROOM, DirectEventData, PresenceBroadcast, PresenceEvent, RedisEvent,
    RoomEventData, WsMessage,
};
use chatcore_pubsub::PubSubTransport;
use tokio::sync::{RwLock, watch};
use tracing::{debug, warn};

use crate::connection::HubConnection;

#[derive(Default)]
struct Maps {
    connections: HashMap<i64, HubConnection>,
    users: HashMap<i64, HashSet<i64>>,
    rooms: HashMap<i64, HashSet<i64>>,
}

/// Per-instance singleton registry of live WebSocket connections.
///
/// Owns three maps — `connections`, `users`, `rooms` — guarded by a single
/// `RwLock` rather than a channel-actor `Run` loop: per §4.5/§5 either
/// discipline is sound as long as it isn't mixed with the other, and a
/// lock is the simpler fit for a hub whose mutations (register, join/leave)
/// are already cheap, non-blocking map edits.
pub struct Hub {
    instance_id: String,
    maps: RwLock<Maps>,
    accepting: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Hub {
    #[must_use]
    pub fn new(instance_id: impl Into<String>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            instance_id: instance_id.into(),
            maps: RwLock::new(Maps::default()),
            accepting: AtomicBool::new(true),
            shutdown_tx,
            shutdown_rx,
        }
    }

    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    // ── Registration ─────────────────────────────────────────────────────

    /// Adds a connection to `connections` and to `users[user_id]`. Dropped
    /// (never registered) if the hub has already begun shutdown.
    pub async fn register(&self, conn: HubConnection) -> bool {
        if !self.accepting.load(Ordering::Acquire) {
            debug!(conn_id = conn.conn_id, "hub shutting down, dropping registration");
            return false;
        }
        let mut maps = self.maps.write().await;
        maps.users.entry(conn.user_id).or_default().insert(conn.conn_id);
        maps.connections.insert(conn.conn_id, conn);
        true
    }

    /// Removes the connection from all three maps; empty per-user or
    /// per-room entries are deleted. Idempotent.
    pub async fn unregister(&self, conn_id: i64) {
        let mut maps = self.maps.write().await;
        let Some(conn) = maps.connections.remove(&conn_id) else { return };

        if let Some(set) = maps.users.get_mut(&conn.user_id) {
            set.remove(&conn_id);
            if set.is_empty() {
                maps.users.remove(&conn.user_id);
            }
        }
        let room_ids: Vec<i64> =
            maps.rooms.iter().filter(|(_, members)| members.contains(&conn_id)).map(|(id, _)| *id).collect();
        for room_id in room_ids {
            if let Some(members) = maps.rooms.get_mut(&room_id) {
                members.remove(&conn_id);
                if members.is_empty() {
                    maps.rooms.remove(&room_id);
                }
            }
        }
    }

    // ── Room membership ──────────────────────────────────────────────────

    pub async fn join_room(&self, conn_id: i64, room_id: i64) {
        let mut maps = self.maps.write().await;
        if !maps.connections.contains_key(&conn_id) {
            return;
        }
        maps.rooms.entry(room_id).or_default().insert(conn_id);
    }

    pub async fn leave_room(&self, conn_id: i64, room_id: i64) {
        let mut maps = self.maps.write().await;
        if let Some(members) = maps.rooms.get_mut(&room_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                maps.rooms.remove(&room_id);
            }
        }
    }

    // ── Fan-out outputs ──────────────────────────────────────────────────

    /// Non-blocking send on each of the user's connections; a full channel
    /// drops the message for that connection only. Returns the number of
    /// connections the frame was actually enqueued for.
    pub async fn send_to_user(&self, user_id: i64, frame: &str) -> usize {
        let maps = self.maps.read().await;
        let Some(conn_ids) = maps.users.get(&user_id) else { return 0 };
        let mut delivered = 0;
        for conn_id in conn_ids {
            if let Some(conn) = maps.connections.get(conn_id)
                && conn.try_send(frame)
            {
                delivered += 1;
            }
        }
        delivered
    }

    /// Like `send_to_user`, but over every member of the room (including the
    /// sender, if the sender has already joined).
    pub async fn broadcast_to_room(&self, room_id: i64, frame: &str) -> usize {
        let maps = self.maps.read().await;
        let Some(conn_ids) = maps.rooms.get(&room_id) else { return 0 };
        let mut delivered = 0;
        for conn_id in conn_ids {
            if let Some(conn) = maps.connections.get(conn_id)
                && conn.try_send(frame)
            {
                delivered += 1;
            }
        }
        delivered
    }

    /// Re-encodes a presence delta and pushes it to every local connection
    /// whose subscription set names the event's user id.
    async fn fanout_presence(&self, evt: &PresenceEvent) {
        let broadcast = PresenceBroadcast::from(evt);
        let payload = match serde_json::to_value(&broadcast) {
            Ok(v) => v,
            Err(err) => {
                warn!(%err, "failed to encode presence broadcast");
                return;
            },
        };
        let Ok(frame) = WsMessage::presence(payload).encode() else { return };

        let maps = self.maps.read().await;
        for conn in maps.connections.values() {
            if conn.is_subscribed_to(evt.user_id).await {
                conn.try_send(&frame);
            }
        }
    }

    // ── Cross-instance fan-out ───────────────────────────────────────────

    /// Applies origin suppression, then fans a direct message out to the
    /// local connections of its recipient.
    async fn handle_remote_direct(&self, envelope: RedisEvent) {
        if envelope.is_from(&self.instance_id) {
            return; // origin suppression — this instance already delivered it locally
        }
        let data: DirectEventData = match serde_json::from_value(envelope.data) {
            Ok(d) => d,
            Err(err) => {
                warn!(%err, "dropping malformed chat.direct envelope");
                return;
            },
        };
        let Ok(frame) = WsMessage::chat(serde_json::json!({
            "kind": "direct",
            "from_user_id": data.from_user_id,
            "to_user_id": data.to_user_id,
            "text": data.text,
        }))
        .encode() else {
            return;
        };
        self.send_to_user(data.to_user_id, &frame).await;
    }

    /// Applies origin suppression — per the §9 redesign flag, identical to
    /// the direct-message rule — then broadcasts to local room members.
    async fn handle_remote_room(&self, envelope: RedisEvent) {
        if envelope.is_from(&self.instance_id) {
            return;
        }
        let data: RoomEventData = match serde_json::from_value(envelope.data) {
            Ok(d) => d,
            Err(err) => {
                warn!(%err, "dropping malformed chat.room envelope");
                return;
            },
        };
        let Ok(frame) = WsMessage::chat(serde_json::json!({
            "kind": "room",
            "from_user_id": data.from_user_id,
            "room_id": data.room_id,
            "text": data.text,
        }))
        .encode() else {
            return;
        };
        self.broadcast_to_room(data.room_id, &frame).await;
    }

    // ── Background bridges ───────────────────────────────────────────────

    /// Spawns the task that drains the presence event bus and fans each
    /// delta out to subscribed local connections. Exits on hub shutdown.
    pub fn spawn_presence_bridge(self: &std::sync::Arc<Self>, mut sub: PresenceSubscription) -> tokio::task::JoinHandle<()> {
        let hub = std::sync::Arc::clone(self);
        let mut shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    evt = sub.rx.recv() => {
                        match evt {
                            Some(evt) => hub.fanout_presence(&evt).await,
                            None => break,
                        }
                    }
                }
            }
        })
    }

    /// Subscribes to `chat.direct`/`chat.room` on the shared pub/sub
    /// transport and spawns the two bridge tasks that apply origin
    /// suppression and fan out locally.
    pub async fn spawn_pubsub_bridges(
        self: &std::sync::Arc<Self>,
        transport: &PubSubTransport,
    ) -> chatcore_common::Result<(tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>)> {
        let direct_sub = transport.subscribe(&[CHANNEL_CHAT_DIRECT]).await?;
        let room_sub = transport.subscribe(&[CHANNEL_CHAT_ROOM]).await?;

        let direct_hub = std::sync::Arc::clone(self);
        let mut direct_shutdown = self.shutdown_rx.clone();
        let direct_task = tokio::spawn(async move {
            let mut direct_sub = direct_sub;
            loop {
                tokio::select! {
                    biased;
                    _ = direct_shutdown.changed() => {
                        if *direct_shutdown.borrow() {
                            break;
                        }
                    }
                    evt = direct_sub.rx.recv() => {
                        match evt {
                            Some(evt) => direct_hub.handle_remote_direct(evt).await,
                            None => break,
                        }
                    }
                }
            }
        });

        let room_hub = std::sync::Arc::clone(self);
        let mut room_shutdown = self.shutdown_rx.clone();
        let room_task = tokio::spawn(async move {
            let mut room_sub = room_sub;
            loop {
                tokio::select! {
                    biased;
                    _ = room_shutdown.changed() => {
                        if *room_shutdown.borrow() {
                            break;
                        }
                    }
                    evt = room_sub.rx.recv() => {
                        match evt {
                            Some(evt) => room_hub.handle_remote_room(evt).await,
                            None => break,
                        }
                    }
                }
            }
        });

        Ok((direct_task, room_task))
    }

    /// Stops accepting new registrations and signals every background
    /// bridge task to exit. Existing connections close independently
    /// through their own read/write loops.
    pub fn shutdown(&self) {
        self.accepting.store(false, Ordering::Release);
        let _ = self.shutdown_tx.send(true);
    }

    /// Number of live connections currently registered. Cheap introspection
    /// for health checks and tests, not used on any hot path.
    pub async fn connection_count(&self) -> usize {
        self.maps.read().await.connections.len()
    }

    /// Number of connections currently joined to `room_id`.
    pub async fn room_member_count(&self, room_id: i64) -> usize {
        self.maps.read().await.rooms.get(&room_id).map_or(0, HashSet::len)
    }
}
