use std::{collections::HashSet, sync::Arc};

use axum::extract::ws::{Message, WebSocket};
use chatcore_hub::{Hub, HubConnection};
use chatcore_presence::PresenceService;
use chatcore_protocol::{Device, MAX_MESSAGE_SIZE, PING_PERIOD, PONG_WAIT, SEND_CHANNEL_CAPACITY, WRITE_WAIT};
use chatcore_router::{ConnectionIdentity, RouterContext};
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, instrument, warn};

/// Drives one live WebSocket through its full lifecycle: presence register,
/// read/write loops, and the close sequence from §4.6. `conn_id` is the
/// caller's locally-generated connection id (monotonic wall-clock nanos is
/// the reference recipe — see [`next_conn_id`]).
#[instrument(skip(socket, hub, presence, router_ctx))]
pub async fn serve(
    socket: WebSocket,
    user_id: i64,
    conn_id: i64,
    device: Device,
    hub: Arc<Hub>,
    presence: Arc<PresenceService>,
    router_ctx: RouterContext,
) {
    if let Err(err) = presence.on_connect(user_id, conn_id, device).await {
        warn!(user_id, conn_id, %err, "presence on_connect failed, refusing connection");
        return;
    }

    let subscriptions = Arc::new(Mutex::new(HashSet::new()));
    let identity = ConnectionIdentity { user_id, conn_id, subscriptions: subscriptions.clone() };

    let (send_tx, send_rx) = mpsc::channel::<String>(SEND_CHANNEL_CAPACITY);
    let hub_conn = HubConnection::new(conn_id, user_id, send_tx.clone(), subscriptions);
    if !hub.register(hub_conn).await {
        warn!(user_id, conn_id, "hub is shutting down, refusing registration");
        if let Err(err) = presence.on_disconnect(user_id, conn_id).await {
            warn!(user_id, conn_id, %err, "presence on_disconnect failed after rejected registration");
        }
        return;
    }

    let (ws_tx, ws_rx) = socket.split();
    let write_handle = tokio::spawn(write_loop(ws_tx, send_rx));

    read_loop(ws_rx, &router_ctx, &identity, &send_tx, &presence).await;

    // Close sequence (§4.6): hub first, presence second, socket last — the
    // write task owns the socket and exits on its own once `send_tx` and its
    // ping ticker have nothing left to do.
    hub.unregister(conn_id).await;
    if let Err(err) = presence.on_disconnect(user_id, conn_id).await {
        warn!(user_id, conn_id, %err, "presence on_disconnect failed");
    }
    drop(send_tx);
    write_handle.abort();
    debug!(user_id, conn_id, "connection closed");
}

/// Reads frames until the socket errs, the peer closes, or `pongWait`
/// elapses without a pong. Malformed frames are skipped, never fatal.
async fn read_loop(
    mut ws_rx: futures::stream::SplitStream<WebSocket>,
    router_ctx: &RouterContext,
    identity: &ConnectionIdentity,
    sender: &mpsc::Sender<String>,
    presence: &PresenceService,
) {
    let mut read_deadline = tokio::time::Instant::now() + PONG_WAIT;

    loop {
        let next = tokio::time::timeout_at(read_deadline, ws_rx.next()).await;
        let frame = match next {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(err))) => {
                debug!(conn_id = identity.conn_id, %err, "read error, closing");
                return;
            },
            Ok(None) => return, // peer closed
            Err(_) => {
                debug!(conn_id = identity.conn_id, "no pong within pongWait, closing");
                return;
            },
        };

        match frame {
            Message::Text(text) => {
                if text.len() > MAX_MESSAGE_SIZE {
                    warn!(conn_id = identity.conn_id, len = text.len(), "frame exceeds max size, dropping");
                    continue;
                }
                chatcore_router::dispatch(&text, router_ctx, identity, sender).await;
            },
            Message::Pong(_) => {
                presence.on_heartbeat(identity.conn_id).await;
                read_deadline = tokio::time::Instant::now() + PONG_WAIT;
            },
            Message::Close(_) => return,
            Message::Binary(_) | Message::Ping(_) => {
                // axum answers Ping automatically; a client-sent Binary frame
                // carries nothing this protocol defines — skip, don't close.
            },
        }
    }
}

/// Drains the outbound channel onto the socket and pings on `pingPeriod`.
/// Exits the moment either a write fails or the channel closes — the only
/// two ways this task is supposed to end.
async fn write_loop(mut ws_tx: futures::stream::SplitSink<WebSocket, Message>, mut send_rx: mpsc::Receiver<String>) {
    let mut ticker = tokio::time::interval(PING_PERIOD);
    ticker.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            frame = send_rx.recv() => {
                let Some(frame) = frame else { return };
                if tokio::time::timeout(WRITE_WAIT, ws_tx.send(Message::Text(frame.into()))).await.is_err() {
                    return;
                }
            }
            _ = ticker.tick() => {
                if tokio::time::timeout(WRITE_WAIT, ws_tx.send(Message::Ping(Vec::new().into()))).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Monotonic-wall-clock-nanos connection id generator, per spec.md §3's
/// "a locally-generated 64-bit connection id (monotonic wall-clock in
/// nanoseconds suffices)" — collisions would require two connections
/// accepted at the exact same nanosecond on the same instance.
#[must_use]
pub fn next_conn_id() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}
