use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chatcore_common::{ChatCoreError, ErrorKind};
use chatcore_presence_store::PresenceStore;
use chatcore_presence_store::TouchOutcome;
use chatcore_protocol::{
    BULK_PRESENCE_CAP, Device, PresenceEvent, PresenceEventType, PresenceSnapshot, PresenceStatus,
};
use tokio::sync::Mutex;
use tracing::{instrument, warn};

use crate::{bus::PresenceEventBus, recently_online::RecentlyOnline};

/// The profile service's user-existence check, called on connect to confirm
/// the user exists before admitting a presence record for them. The profile
/// service's own implementation is out of scope here — this is the thin
/// contract it fulfills.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn user_exists(&self, user_id: i64) -> chatcore_common::Result<bool>;
}

/// A `ProfileDirectory` that always answers "exists", for deployments or
/// tests that don't need the existence check on the lifecycle path.
pub struct PermissiveDirectory;

#[async_trait]
impl ProfileDirectory for PermissiveDirectory {
    async fn user_exists(&self, _user_id: i64) -> chatcore_common::Result<bool> {
        Ok(true)
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Namespaces synthetic connection ids minted by `MarkOnline`/`MarkOffline`/
/// `UpdateLastSeen` so they can never collide with a real WS-issued
/// (positive, monotonic-nanos) connection id.
fn synthetic_conn_id(user_id: i64) -> i64 {
    -(user_id.wrapping_add(1))
}

/// The narrow read surface the router needs to answer `get_online_friends`
/// queries, pulled out so callers that only need that one query can depend
/// on it instead of the full service — and so their tests can swap in a
/// stub instead of standing up a live connection store.
#[async_trait]
pub trait PresenceQuery: Send + Sync {
    async fn get_online_friends(&self, friend_ids: &[i64]) -> Vec<i64>;
}

/// Answers every friend id in `online` and nothing else. Used by tests that
/// exercise routing around a presence query without a live connection store.
pub struct StubPresenceQuery {
    pub online: Vec<i64>,
}

#[async_trait]
impl PresenceQuery for StubPresenceQuery {
    async fn get_online_friends(&self, friend_ids: &[i64]) -> Vec<i64> {
        friend_ids.iter().copied().filter(|id| self.online.contains(id)).collect()
    }
}

/// The only component that writes to the connection store, and the only
/// source of events on the presence event bus.
pub struct PresenceService {
    store: PresenceStore,
    bus: PresenceEventBus,
    idle_threshold: Duration,
    profile: Arc<dyn ProfileDirectory>,
    recently_online: Mutex<RecentlyOnline>,
}

impl PresenceService {
    #[must_use]
    pub fn new(
        store: PresenceStore,
        bus: PresenceEventBus,
        idle_threshold: Duration,
        profile: Arc<dyn ProfileDirectory>,
    ) -> Self {
        Self { store, bus, idle_threshold, profile, recently_online: Mutex::new(RecentlyOnline::new()) }
    }

    fn validate_identity(user_id: i64, conn_id: i64) -> chatcore_common::Result<()> {
        if user_id <= 0 {
            return Err(ChatCoreError::new(ErrorKind::InvalidUserId, "user_id must be positive"));
        }
        if conn_id <= 0 {
            return Err(ChatCoreError::new(ErrorKind::InvalidConnId, "conn_id must be positive"));
        }
        Ok(())
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    #[instrument(skip(self))]
    pub async fn on_connect(&self, user_id: i64, conn_id: i64, device: Device) -> chatcore_common::Result<()> {
        Self::validate_identity(user_id, conn_id)?;
        if !self.profile.user_exists(user_id).await? {
            return Err(ChatCoreError::new(ErrorKind::UserNotFound, format!("user {user_id} does not exist")));
        }

        let was_offline = self.store.get_user_connections(user_id).await?.is_empty();
        self.store.add_connection(user_id, conn_id, device).await?;

        if was_offline {
            self.bus.publish(PresenceEvent { user_id, r#type: PresenceEventType::UserOnline }).await;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn on_disconnect(&self, user_id: i64, conn_id: i64) -> chatcore_common::Result<()> {
        Self::validate_identity(user_id, conn_id)?;
        self.store.remove_connection(user_id, conn_id).await?;

        let remaining = self.store.get_user_connections(user_id).await?;
        if remaining.is_empty() {
            self.recently_online.lock().await.touch(user_id, now_ms());
            self.bus.publish(PresenceEvent { user_id, r#type: PresenceEventType::UserOffline }).await;
        }
        Ok(())
    }

    /// A heartbeat for an unknown connection is logged and swallowed — the
    /// WS layer tears the dead connection down independently when its pong
    /// times out.
    #[instrument(skip(self))]
    pub async fn on_heartbeat(&self, conn_id: i64) {
        match self.store.touch_connection(conn_id).await {
            Ok(TouchOutcome::Touched) => {},
            Ok(TouchOutcome::NotFound) => {
                warn!(conn_id, "heartbeat for connection with no presence record; dropping");
            },
            Err(err) => {
                warn!(conn_id, %err, "presence heartbeat failed");
            },
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Never fails the call: underlying errors degrade to `offline`.
    pub async fn get_presence(&self, user_id: i64) -> PresenceSnapshot {
        match self.store.get_user_connections(user_id).await {
            Ok(conns) if !conns.is_empty() => {
                let last_activity = conns.iter().map(|c| c.last_activity_ms).max().unwrap_or_default();
                let idle_ms = self.idle_threshold.as_millis() as i64;
                let status =
                    if now_ms() - last_activity > idle_ms { PresenceStatus::Idle } else { PresenceStatus::Online };
                PresenceSnapshot { user_id, status, last_seen: Some(last_activity) }
            },
            Ok(_) => {
                let last_seen = self.recently_online.lock().await.last_seen(user_id);
                PresenceSnapshot::offline(user_id, last_seen)
            },
            Err(err) => {
                warn!(user_id, %err, "presence query failed, reporting offline");
                PresenceSnapshot::offline(user_id, None)
            },
        }
    }

    /// Empty input returns empty without touching the store.
    pub async fn get_online_friends(&self, friend_ids: &[i64]) -> Vec<i64> {
        if friend_ids.is_empty() {
            return Vec::new();
        }
        let mut online = Vec::new();
        for &friend_id in friend_ids {
            let snapshot = self.get_presence(friend_id).await;
            if matches!(snapshot.status, PresenceStatus::Online | PresenceStatus::Idle) {
                online.push(friend_id);
            }
        }
        online
    }

    /// Hard cap of 1000 entries; truncates silently above it.
    pub async fn get_bulk_presence(&self, user_ids: &[i64]) -> HashMap<i64, PresenceSnapshot> {
        let capped = &user_ids[..user_ids.len().min(BULK_PRESENCE_CAP)];
        let mut map = HashMap::with_capacity(capped.len());
        for &user_id in capped {
            map.insert(user_id, self.get_presence(user_id).await);
        }
        map
    }

    // ── Supplemental gRPC surface ────────────────────────────────────────

    /// Forces a user online via a namespaced synthetic connection, for
    /// ops/admin tooling that doesn't hold a real WebSocket.
    pub async fn mark_online(&self, user_id: i64) -> chatcore_common::Result<()> {
        self.on_connect(user_id, synthetic_conn_id(user_id), Device::Web).await
    }

    pub async fn mark_offline(&self, user_id: i64) -> chatcore_common::Result<()> {
        self.on_disconnect(user_id, synthetic_conn_id(user_id)).await
    }

    pub async fn update_last_seen(&self, user_id: i64) -> chatcore_common::Result<()> {
        self.store.touch_connection(synthetic_conn_id(user_id)).await.ok();
        self.recently_online.lock().await.touch(user_id, now_ms());
        Ok(())
    }

    pub async fn get_recently_online(&self, limit: usize) -> Vec<(i64, i64)> {
        self.recently_online.lock().await.recently_online(limit)
    }
}

#[async_trait]
impl PresenceQuery for PresenceService {
    async fn get_online_friends(&self, friend_ids: &[i64]) -> Vec<i64> {
        PresenceService::get_online_friends(self, friend_ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_user_id() {
        assert!(PresenceService::validate_identity(0, 1).is_err());
        assert!(PresenceService::validate_identity(-1, 1).is_err());
    }

    #[test]
    fn rejects_non_positive_conn_id() {
        assert!(PresenceService::validate_identity(1, 0).is_err());
    }

    #[test]
    fn synthetic_conn_ids_are_negative_and_distinct() {
        assert!(synthetic_conn_id(42) < 0);
        assert_ne!(synthetic_conn_id(42), synthetic_conn_id(43));
    }
}
