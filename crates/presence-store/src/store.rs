use std::time::Duration;

use chatcore_common::{ChatCoreError, ErrorKind, Result};
use chatcore_protocol::{ConnectionRecord, Device};
use redis::{AsyncCommands, Script, aio::ConnectionManager};
use tracing::{debug, warn};

use crate::scripts;

fn conn_key(conn_id: i64) -> String {
    format!("conn:{conn_id}")
}

fn user_conns_key(user_id: i64) -> String {
    format!("user:{user_id}:conns")
}

fn now_ms() -> i64 {
    // SystemTime rather than a monotonic clock: this is an epoch-millis
    // wire timestamp stored alongside the record, not a duration measurement.
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchOutcome {
    Touched,
    NotFound,
}

/// Redis-backed connection ledger. Cheap to clone — wraps a
/// `ConnectionManager`, which is itself a handle around a shared,
/// auto-reconnecting multiplexed connection.
#[derive(Clone)]
pub struct PresenceStore {
    manager: ConnectionManager,
    ttl: Duration,
    add_connection: Script,
    remove_connection: Script,
    touch_connection: Script,
    cleanup_dangling: Script,
}

impl PresenceStore {
    /// Connect to Redis and pre-load the Lua scripts. `ttl` is
    /// `idle_threshold + grace`, the connection-record TTL.
    pub async fn connect(redis_url: &str, ttl: Duration) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "invalid redis url", e))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "redis connect failed", e))?;
        Ok(Self {
            manager,
            ttl,
            add_connection: scripts::add_connection(),
            remove_connection: scripts::remove_connection(),
            touch_connection: scripts::touch_connection(),
            cleanup_dangling: scripts::cleanup_dangling(),
        })
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs()
    }

    /// Creates or overwrites the connection record and adds it to the
    /// user's connection set. Atomic.
    pub async fn add_connection(&self, user_id: i64, conn_id: i64, device: Device) -> Result<()> {
        if user_id <= 0 {
            return Err(ChatCoreError::new(ErrorKind::InvalidUserId, "user_id must be positive"));
        }
        if conn_id <= 0 {
            return Err(ChatCoreError::new(ErrorKind::InvalidConnId, "conn_id must be positive"));
        }
        let mut conn = self.manager.clone();
        self.add_connection
            .key(conn_key(conn_id))
            .arg(self.ttl_secs())
            .arg(user_id)
            .arg(conn_id)
            .arg(device.as_str())
            .arg(now_ms())
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "add_connection failed", e))?;
        Ok(())
    }

    /// Deletes the record and removes it from the user set; deletes the set
    /// if it becomes empty. Idempotent.
    pub async fn remove_connection(&self, user_id: i64, conn_id: i64) -> Result<()> {
        let mut conn = self.manager.clone();
        self.remove_connection
            .key(conn_key(conn_id))
            .arg(user_id)
            .arg(conn_id)
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "remove_connection failed", e))?;
        Ok(())
    }

    /// Refreshes `last_activity_ms` and the TTL if the record still
    /// exists. Never recreates an expired record.
    pub async fn touch_connection(&self, conn_id: i64) -> Result<TouchOutcome> {
        let mut conn = self.manager.clone();
        let touched: i64 = self
            .touch_connection
            .key(conn_key(conn_id))
            .arg(self.ttl_secs())
            .arg(now_ms())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "touch_connection failed", e))?;
        Ok(if touched == 1 { TouchOutcome::Touched } else { TouchOutcome::NotFound })
    }

    /// Returns all live connection records for the user, silently skipping
    /// ids whose backing record has already expired (dangling set entries).
    pub async fn get_user_connections(&self, user_id: i64) -> Result<Vec<ConnectionRecord>> {
        let mut conn = self.manager.clone();
        let ids: Vec<i64> = conn
            .smembers(user_conns_key(user_id))
            .await
            .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "smembers failed", e))?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let fields: std::collections::HashMap<String, String> = conn
                .hgetall(conn_key(id))
                .await
                .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "hgetall failed", e))?;
            if fields.is_empty() {
                // Dangling: the set still names it, the hash already expired.
                continue;
            }
            let Some(record) = parse_record(&fields) else {
                warn!(conn_id = id, "skipping connection record with unparsable fields");
                continue;
            };
            records.push(record);
        }
        Ok(records)
    }

    /// Repairs the user set by removing ids whose record no longer exists.
    /// Returns the number of dangling ids removed.
    pub async fn cleanup_dangling_connections(&self, user_id: i64) -> Result<i64> {
        let mut conn = self.manager.clone();
        let removed: i64 = self
            .cleanup_dangling
            .key(user_conns_key(user_id))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "cleanup_dangling failed", e))?;
        if removed > 0 {
            debug!(user_id, removed, "repaired dangling presence connections");
        }
        Ok(removed)
    }
}

fn parse_record(fields: &std::collections::HashMap<String, String>) -> Option<ConnectionRecord> {
    Some(ConnectionRecord {
        user_id: fields.get("user_id")?.parse().ok()?,
        conn_id: fields.get("conn_id")?.parse().ok()?,
        device: Device::parse(fields.get("device")?)?,
        connected_at_ms: fields.get("connected_at_ms")?.parse().ok()?,
        last_activity_ms: fields.get("last_activity_ms")?.parse().ok()?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_record() {
        let mut fields = std::collections::HashMap::new();
        fields.insert("user_id".into(), "42".into());
        fields.insert("conn_id".into(), "99".into());
        fields.insert("device".into(), "web".into());
        fields.insert("connected_at_ms".into(), "1000".into());
        fields.insert("last_activity_ms".into(), "2000".into());

        let record = parse_record(&fields).expect("valid record");
        assert_eq!(record.user_id, 42);
        assert_eq!(record.conn_id, 99);
        assert_eq!(record.device, Device::Web);
        assert_eq!(record.last_activity_ms, 2000);
    }

    #[test]
    fn rejects_unknown_device() {
        let mut fields = std::collections::HashMap::new();
        fields.insert("user_id".into(), "42".into());
        fields.insert("conn_id".into(), "99".into());
        fields.insert("device".into(), "toaster".into());
        fields.insert("connected_at_ms".into(), "1000".into());
        fields.insert("last_activity_ms".into(), "2000".into());

        assert!(parse_record(&fields).is_none());
    }

    #[test]
    fn rejects_missing_fields() {
        let fields = std::collections::HashMap::new();
        assert!(parse_record(&fields).is_none());
    }

    #[test]
    fn key_helpers_use_expected_redis_layout() {
        assert_eq!(conn_key(7), "conn:7");
        assert_eq!(user_conns_key(42), "user:42:conns");
    }
}
