//! The WebSocket frame envelope and its typed payloads.

use serde::{Deserialize, Serialize};

/// Framing on every wire direction: `{ "type": "...", "payload": <opaque> }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WsMessageType {
    Chat,
    Presence,
    Ping,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    pub r#type: WsMessageType,
    pub payload: serde_json::Value,
}

impl WsMessage {
    #[must_use]
    pub fn new(r#type: WsMessageType, payload: serde_json::Value) -> Self {
        Self { r#type, payload }
    }

    #[must_use]
    pub fn system(payload: serde_json::Value) -> Self {
        Self::new(WsMessageType::System, payload)
    }

    #[must_use]
    pub fn chat(payload: serde_json::Value) -> Self {
        Self::new(WsMessageType::Chat, payload)
    }

    #[must_use]
    pub fn presence(payload: serde_json::Value) -> Self {
        Self::new(WsMessageType::Presence, payload)
    }

    /// Decode a single text frame. The read loop skips malformed frames
    /// rather than closing the connection, so this returns a plain
    /// `serde_json::Error` for the caller to log and move past.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ── Presence payload ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceCmd {
    Subscribe,
    Unsubscribe,
    GetOnlineFriends,
}

/// `{ "cmd": "subscribe"|"unsubscribe"|"get_online_friends", "user_ids": [..] }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceCommand {
    pub cmd: PresenceCmd,
    #[serde(default)]
    pub user_ids: Vec<i64>,
}

// ── Chat payload ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Direct,
    Room,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomAction {
    Join,
    Leave,
}

/// `{ "kind": "direct"|"room", "to_user_id"?, "room_id"?, "text", "action"? }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCommand {
    pub kind: ChatKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<i64>,
    #[serde(default)]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<RoomAction>,
}

/// Frame pushed back to a sender whose direct message was rejected by the
/// authz gate, or any other diagnostic the server needs to surface inline:
/// handlers never let an error unwind out of the read loop, they turn it
/// into a frame like this one instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRejection {
    pub kind: &'static str, // always "rejected"
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_user_id: Option<i64>,
}

impl ChatRejection {
    #[must_use]
    pub fn new(reason: impl Into<String>, to_user_id: Option<i64>) -> Self {
        Self { kind: "rejected", reason: reason.into(), to_user_id }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn decodes_presence_subscribe() {
        let raw = r#"{"type":"presence","payload":{"cmd":"subscribe","user_ids":[1,2,3]}}"#;
        let msg = WsMessage::decode(raw).expect("valid frame");
        assert_eq!(msg.r#type, WsMessageType::Presence);
        let cmd: PresenceCommand = serde_json::from_value(msg.payload).unwrap();
        assert_eq!(cmd.cmd, PresenceCmd::Subscribe);
        assert_eq!(cmd.user_ids, vec![1, 2, 3]);
    }

    #[test]
    fn decodes_chat_direct() {
        let raw = r#"{"type":"chat","payload":{"kind":"direct","to_user_id":7,"text":"hi"}}"#;
        let msg = WsMessage::decode(raw).expect("valid frame");
        let cmd: ChatCommand = serde_json::from_value(msg.payload).unwrap();
        assert_eq!(cmd.kind, ChatKind::Direct);
        assert_eq!(cmd.to_user_id, Some(7));
        assert_eq!(cmd.text, "hi");
        assert!(cmd.action.is_none());
    }

    #[test]
    fn decodes_room_join() {
        let raw = r#"{"type":"chat","payload":{"kind":"room","room_id":10,"action":"join"}}"#;
        let msg = WsMessage::decode(raw).expect("valid frame");
        let cmd: ChatCommand = serde_json::from_value(msg.payload).unwrap();
        assert_eq!(cmd.kind, ChatKind::Room);
        assert_eq!(cmd.room_id, Some(10));
        assert_eq!(cmd.action, Some(RoomAction::Join));
        assert_eq!(cmd.text, "");
    }

    #[test]
    fn malformed_frame_does_not_panic() {
        let err = WsMessage::decode("not json at all").unwrap_err();
        assert!(err.is_syntax() || err.is_data());
    }
}
