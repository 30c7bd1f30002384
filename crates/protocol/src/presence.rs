//! Presence domain types shared by the connection store, presence service,
//! event bus, and session hub.

use serde::{Deserialize, Serialize};

/// The device class a connection was opened from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Web,
    Ios,
    Android,
    Desktop,
}

impl Device {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Ios => "ios",
            Self::Android => "android",
            Self::Desktop => "desktop",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "web" => Some(Self::Web),
            "ios" => Some(Self::Ios),
            "android" => Some(Self::Android),
            "desktop" => Some(Self::Desktop),
            _ => None,
        }
    }
}

/// Derived presence status. Computed on read from connection activity,
/// never stored directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Idle,
    Offline,
}

/// Result of a presence lookup for a single user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub user_id: i64,
    pub status: PresenceStatus,
    /// Epoch-millis of the most recent activity across current or recently
    /// expired connections; `None` if the user has never connected.
    pub last_seen: Option<i64>,
}

impl PresenceSnapshot {
    #[must_use]
    pub fn offline(user_id: i64, last_seen: Option<i64>) -> Self {
        Self { user_id, status: PresenceStatus::Offline, last_seen }
    }
}

/// A single stored connection record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub user_id: i64,
    pub conn_id: i64,
    pub device: Device,
    pub connected_at_ms: i64,
    pub last_activity_ms: i64,
}

/// Internal event kind: published by the presence service, consumed by the
/// session hub for fan-out to subscribed connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceEventType {
    UserOnline,
    UserOffline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub user_id: i64,
    pub r#type: PresenceEventType,
}

/// Server-originated presence broadcast payload pushed over a subscribed
/// WS connection: `{ "user_id": int64, "event": "user_online"|"user_offline" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceBroadcast {
    pub user_id: i64,
    pub event: PresenceEventType,
}

impl From<&PresenceEvent> for PresenceBroadcast {
    fn from(evt: &PresenceEvent) -> Self {
        Self { user_id: evt.user_id, event: evt.r#type }
    }
}
