//! Notification hub opcodes, event names, and wire-format messages.
//!
//! Every frame is a JSON text message. The hub speaks [`ServerMessage`],
//! clients speak [`ClientMessage`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::notification::NotificationContent;

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_INVOKE: u8 = 4;
pub const OP_COMPLETION: u8 = 5;
pub const OP_HEARTBEAT_ACK: u8 = 6;
pub const OP_RECONNECT: u8 = 7;

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// A message sent from the hub to the client over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMessage {
    pub op: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default)]
    pub d: Value,
}

impl ServerMessage {
    /// Build a DISPATCH message (op=0).
    pub fn dispatch(event_name: &str, seq: u64, data: Value) -> Self {
        Self {
            op: OP_DISPATCH,
            t: Some(event_name.to_string()),
            s: Some(seq),
            d: data,
        }
    }

    /// Build the READY dispatch that completes the handshake.
    pub fn ready(seq: u64, payload: &ReadyPayload) -> Self {
        Self::dispatch(
            EventName::READY,
            seq,
            serde_json::to_value(payload).unwrap_or_default(),
        )
    }

    /// Build a `ReceiveNotification` dispatch.
    pub fn notification(seq: u64, content: &NotificationContent) -> Self {
        Self::dispatch(
            EventName::RECEIVE_NOTIFICATION,
            seq,
            serde_json::to_value(content).unwrap_or_default(),
        )
    }

    /// Build a COMPLETION message (op=5) for an invocation.
    pub fn completion(id: u64, error: Option<String>) -> Self {
        Self {
            op: OP_COMPLETION,
            t: None,
            s: None,
            d: serde_json::to_value(CompletionPayload { id, error }).unwrap_or_default(),
        }
    }

    /// Build a HEARTBEAT_ACK message (op=6).
    pub fn heartbeat_ack(seq: u64) -> Self {
        Self {
            op: OP_HEARTBEAT_ACK,
            t: None,
            s: None,
            d: serde_json::json!({ "ack": seq }),
        }
    }

    /// Build a RECONNECT message (op=7) asking the client to reconnect.
    pub fn reconnect(reason: &str) -> Self {
        Self {
            op: OP_RECONNECT,
            t: None,
            s: None,
            d: serde_json::json!({ "reason": reason }),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// A message sent from the client to the hub over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub op: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub d: Value,
}

impl ClientMessage {
    /// Build a HEARTBEAT message (op=1).
    pub fn heartbeat(seq: u64) -> Self {
        Self {
            op: OP_HEARTBEAT,
            t: None,
            id: None,
            d: serde_json::json!({ "seq": seq }),
        }
    }

    /// Build an INVOKE message (op=4) for a hub method.
    pub fn invoke(id: u64, method: &str, args: Value) -> Self {
        Self {
            op: OP_INVOKE,
            t: Some(method.to_string()),
            id: Some(id),
            d: args,
        }
    }
}

// ---------------------------------------------------------------------------
// READY payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub connection_id: String,
    /// Interval (ms) at which the client must send HEARTBEAT.
    pub heartbeat_interval: u64,
}

// ---------------------------------------------------------------------------
// COMPLETION payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionPayload {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// HEARTBEAT payload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// JoinGroup / LeaveGroup payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupPayload {
    pub group: String,
}

// ---------------------------------------------------------------------------
// Dispatch event names and invocation targets
// ---------------------------------------------------------------------------

/// Event names dispatched to clients.
pub struct EventName;

impl EventName {
    pub const READY: &'static str = "READY";
    pub const RECEIVE_NOTIFICATION: &'static str = "ReceiveNotification";
}

/// Hub methods a client may invoke.
pub struct Method;

impl Method {
    pub const SEND_NOTIFICATION: &'static str = "SendNotification";
    pub const JOIN_GROUP: &'static str = "JoinGroup";
    pub const LEAVE_GROUP: &'static str = "LeaveGroup";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_dispatch_shape() {
        let content = NotificationContent::new("Low stock", "SKU-1 low", "low_stock");
        let msg = ServerMessage::notification(3, &content);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["op"], 0);
        assert_eq!(json["t"], "ReceiveNotification");
        assert_eq!(json["s"], 3);
        assert_eq!(json["d"]["title"], "Low stock");
        assert_eq!(json["d"]["type"], "low_stock");
    }

    #[test]
    fn completion_omits_error_on_success() {
        let json = serde_json::to_value(ServerMessage::completion(7, None)).unwrap();
        assert_eq!(json["op"], 5);
        assert_eq!(json["d"]["id"], 7);
        assert!(json["d"].get("error").is_none());
        assert!(json.get("t").is_none());
    }

    #[test]
    fn client_invoke_parses_with_defaults() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"op":4,"t":"JoinGroup","id":1,"d":{"group":"admins"}}"#)
                .unwrap();
        assert_eq!(msg.op, OP_INVOKE);
        assert_eq!(msg.t.as_deref(), Some(Method::JOIN_GROUP));
        let payload: GroupPayload = serde_json::from_value(msg.d).unwrap();
        assert_eq!(payload.group, "admins");

        let hb: ClientMessage = serde_json::from_str(r#"{"op":1}"#).unwrap();
        assert_eq!(hb.op, OP_HEARTBEAT);
        assert!(hb.id.is_none());
        assert!(hb.d.is_null());
    }
}
