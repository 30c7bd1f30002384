//! Single-writer, many-reader in-process fan-out of presence deltas.
//!
//! A `tokio::sync::RwLock` guards the subscriber set: `publish` takes the
//! read lock and does a non-blocking send per subscriber (slow subscribers
//! drop events rather than stall the emitter); `subscribe`/`unsubscribe`
//! take the write lock.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use chatcore_protocol::{PRESENCE_SUB_CAPACITY, PresenceEvent};
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

/// A live subscription on the bus. Dropping it unsubscribes, guaranteeing
/// the channel is closed exactly once and that no event arrives afterward.
pub struct PresenceSubscription {
    id: u64,
    bus: PresenceEventBus,
    pub rx: mpsc::Receiver<PresenceEvent>,
}

impl PresenceSubscription {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for PresenceSubscription {
    fn drop(&mut self) {
        let bus = self.bus.clone();
        let id = self.id;
        tokio::spawn(async move {
            bus.unsubscribe(id).await;
        });
    }
}

#[derive(Clone)]
pub struct PresenceEventBus {
    subscribers: Arc<RwLock<HashMap<u64, mpsc::Sender<PresenceEvent>>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for PresenceEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self { subscribers: Arc::new(RwLock::new(HashMap::new())), next_id: Arc::new(AtomicU64::new(1)) }
    }

    pub async fn subscribe(&self) -> PresenceSubscription {
        let (tx, rx) = mpsc::channel(PRESENCE_SUB_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().await.insert(id, tx);
        PresenceSubscription { id, bus: self.clone(), rx }
    }

    pub async fn unsubscribe(&self, id: u64) {
        // Dropping the removed sender closes the receiver's channel exactly once.
        self.subscribers.write().await.remove(&id);
    }

    pub async fn publish(&self, event: PresenceEvent) {
        let subs = self.subscribers.read().await;
        for tx in subs.values() {
            if tx.try_send(event.clone()).is_err() {
                debug!(user_id = event.user_id, "dropping presence event for slow/closed subscriber");
            }
        }
    }

    #[cfg(test)]
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chatcore_protocol::PresenceEventType;

    #[tokio::test]
    async fn subscriber_receives_events_published_while_subscribed() {
        let bus = PresenceEventBus::new();
        let mut sub = bus.subscribe().await;

        bus.publish(PresenceEvent { user_id: 1, r#type: PresenceEventType::UserOnline }).await;
        let evt = sub.rx.recv().await.expect("event delivered");
        assert_eq!(evt.user_id, 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_future_delivery() {
        let bus = PresenceEventBus::new();
        let sub = bus.subscribe().await;
        let id = sub.id();
        drop(sub);
        // Drop spawns the unsubscribe task; wait for the subscriber set to shrink.
        for _ in 0..50 {
            if bus.subscriber_count().await == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        bus.unsubscribe(id).await; // idempotent if the spawned drop already ran
        assert_eq!(bus.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn full_buffer_drops_instead_of_blocking() {
        let bus = PresenceEventBus::new();
        let sub = bus.subscribe().await;
        // Fill the bounded channel without ever receiving.
        for i in 0..(chatcore_protocol::PRESENCE_SUB_CAPACITY as i64 + 5) {
            bus.publish(PresenceEvent { user_id: i, r#type: PresenceEventType::UserOnline }).await;
        }
        // Did not deadlock or panic; the subscriber is still registered.
        assert_eq!(bus.subscriber_count().await, 1);
        drop(sub);
    }
}
