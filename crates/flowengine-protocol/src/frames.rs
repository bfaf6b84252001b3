//! Wire envelope for the realtime session socket (§4.7, §6).
//!
//! Unlike a general RPC framing, this channel carries exactly three inbound
//! shapes and two outbound ones, so the frames here are the literal messages
//! rather than a req/res/event wrapper around an arbitrary payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{Event, FlowExecutionState};

/// Client → server. A bare `"pong"` string is handled separately by the
/// caller before attempting to deserialize as this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    UserMessage {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flow_data: Option<Value>,
    },
    Pong,
}

/// Server → client.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Ping(PingFrame),
    Event(Event),
    Snapshot(FlowExecutionState),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
}

impl PingFrame {
    pub fn new() -> Self {
        Self {
            frame_type: "ping".to_string(),
        }
    }
}

impl Default for PingFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an inbound text frame, handling the bare `"pong"` string the spec
/// allows alongside `{"type":"pong"}`.
pub fn parse_client_message(text: &str) -> Option<ClientMessage> {
    let trimmed = text.trim();
    if trimmed == "\"pong\"" || trimmed.trim_matches('"') == "pong" {
        return Some(ClientMessage::Pong);
    }
    serde_json::from_str(text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_message() {
        let json = r#"{"type":"user_message","message":"hi"}"#;
        let msg = parse_client_message(json).unwrap();
        match msg {
            ClientMessage::UserMessage { message, flow_data } => {
                assert_eq!(message, "hi");
                assert!(flow_data.is_none());
            }
            other => panic!("expected user_message, got {other:?}"),
        }
    }

    #[test]
    fn parses_typed_pong() {
        let msg = parse_client_message(r#"{"type":"pong"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Pong));
    }

    #[test]
    fn parses_bare_pong_string() {
        let msg = parse_client_message("pong").unwrap();
        assert!(matches!(msg, ClientMessage::Pong));
    }

    #[test]
    fn ignores_unknown_shape() {
        assert!(parse_client_message(r#"{"type":"unknown"}"#).is_none());
    }

    #[test]
    fn ping_frame_serializes() {
        let json = serde_json::to_string(&PingFrame::new()).unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);
    }
}
