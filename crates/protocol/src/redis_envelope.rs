//! The cross-instance pub/sub envelope used to fan chat events out to every
//! gateway instance.

use serde::{Deserialize, Serialize};

/// `{ "type": string, "instance_id": string, "data": <opaque> }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisEvent {
    pub r#type: String,
    pub instance_id: String,
    pub data: serde_json::Value,
}

impl RedisEvent {
    #[must_use]
    pub fn new(r#type: impl Into<String>, instance_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self { r#type: r#type.into(), instance_id: instance_id.into(), data }
    }

    /// True if this envelope originated from `instance_id` itself — used to
    /// drop an instance's own publications on the way back in.
    #[must_use]
    pub fn is_from(&self, instance_id: &str) -> bool {
        self.instance_id == instance_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectEventData {
    pub to_user_id: i64,
    pub from_user_id: i64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEventData {
    pub room_id: i64,
    pub from_user_id: i64,
    pub text: String,
}
