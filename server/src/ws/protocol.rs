//! JSON envelope format shared by chat and notification sessions.
//!
//! Every frame is a flat object tagged by `"type"`. Inbound frames are decoded
//! once into [`ClientEvent`]; outbound frames are built as [`ServerEvent`] and
//! serialized once per broadcast.

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::db::models::Identity;
use crate::notify::FeedbackUpdate;

/// Server going away (keepalive timeout).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Token signature valid but expiry has passed.
pub const CLOSE_TOKEN_EXPIRED: u16 = 4000;
/// Token failed to decode or verify, or names an unknown user.
pub const CLOSE_TOKEN_INVALID: u16 = 4001;
/// No `token` query parameter.
pub const CLOSE_TOKEN_MISSING: u16 = 4002;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not a JSON object: {0}")]
    InvalidJson(String),

    #[error("frame has no string \"type\" field")]
    MissingType,

    #[error("invalid {event} payload: {reason}")]
    InvalidPayload { event: &'static str, reason: String },
}

/// Client → server events.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// `{"type":"chat_message","message":"…","temp_id":…?}`
    ChatMessage {
        message: String,
        /// Opaque client value (string or number), echoed back untouched
        temp_id: Option<Value>,
    },
    /// `{"type":"typing","receiver":…}`. The receiver is validated by the session.
    Typing { receiver: Option<Value> },
    /// Any other tag. Carries the tag for logging.
    Unrecognized(String),
}

#[derive(Deserialize)]
struct ChatMessageFrame {
    message: String,
    #[serde(default)]
    temp_id: Option<Value>,
}

#[derive(Deserialize)]
struct TypingFrame {
    #[serde(default)]
    receiver: Option<Value>,
}

impl ClientEvent {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        if !value.is_object() {
            return Err(ProtocolError::InvalidJson("expected an object".to_string()));
        }

        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        match tag.as_str() {
            "chat_message" => {
                let frame: ChatMessageFrame =
                    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload {
                        event: "chat_message",
                        reason: e.to_string(),
                    })?;
                Ok(ClientEvent::ChatMessage {
                    message: frame.message,
                    temp_id: frame.temp_id,
                })
            }
            "typing" => {
                let frame: TypingFrame =
                    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload {
                        event: "typing",
                        reason: e.to_string(),
                    })?;
                Ok(ClientEvent::Typing {
                    receiver: frame.receiver,
                })
            }
            _ => Ok(ClientEvent::Unrecognized(tag)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    Offline,
}

/// Server → client events. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    ChatMessage {
        /// Server-assigned message id
        id: i64,
        message: String,
        user: Identity,
        timestamp: DateTime<Utc>,
        /// Client correlation token, echoed back for optimistic rendering
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temp_id: Option<Value>,
    },
    Typing {
        user: Identity,
        receiver: i64,
        is_typing: bool,
    },
    #[serde(rename = "online_status")]
    Presence {
        online_users: Vec<Identity>,
        status: PresenceState,
    },
    FeedbackUpdate { feedback: FeedbackUpdate },
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::ChatMessage { .. } => "chat_message",
            ServerEvent::Typing { .. } => "typing",
            ServerEvent::Presence { .. } => "online_status",
            ServerEvent::FeedbackUpdate { .. } => "feedback_update",
        }
    }

    /// Encode as a WebSocket text frame.
    pub fn to_frame(&self) -> Result<Message, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(Message::Text(json.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alice() -> Identity {
        Identity {
            id: 1,
            username: "alice".to_string(),
            is_staff: false,
            is_superuser: false,
        }
    }

    #[test]
    fn test_decode_chat_message_with_temp_id() {
        let event =
            ClientEvent::decode(r#"{"type":"chat_message","message":"hi","temp_id":"abc123"}"#)
                .unwrap();
        assert_eq!(
            event,
            ClientEvent::ChatMessage {
                message: "hi".to_string(),
                temp_id: Some(json!("abc123")),
            }
        );
    }

    #[test]
    fn test_decode_chat_message_with_numeric_temp_id() {
        let event =
            ClientEvent::decode(r#"{"type":"chat_message","message":"hi","temp_id":1717}"#)
                .unwrap();
        assert_eq!(
            event,
            ClientEvent::ChatMessage {
                message: "hi".to_string(),
                temp_id: Some(json!(1717)),
            }
        );
    }

    #[test]
    fn test_decode_chat_message_without_content_is_invalid() {
        let err = ClientEvent::decode(r#"{"type":"chat_message"}"#).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidPayload {
                event: "chat_message",
                ..
            }
        ));
    }

    #[test]
    fn test_decode_typing_keeps_raw_receiver() {
        let event = ClientEvent::decode(r#"{"type":"typing","receiver":"7"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Typing {
                receiver: Some(json!("7"))
            }
        );

        let event = ClientEvent::decode(r#"{"type":"typing"}"#).unwrap();
        assert_eq!(event, ClientEvent::Typing { receiver: None });
    }

    #[test]
    fn test_decode_unknown_and_malformed() {
        assert_eq!(
            ClientEvent::decode(r#"{"type":"read_receipt","id":3}"#).unwrap(),
            ClientEvent::Unrecognized("read_receipt".to_string())
        );
        assert!(matches!(
            ClientEvent::decode("not json"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            ClientEvent::decode("[1,2]"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            ClientEvent::decode(r#"{"message":"hi"}"#),
            Err(ProtocolError::MissingType)
        ));
    }

    #[test]
    fn test_chat_message_wire_shape() {
        let event = ServerEvent::ChatMessage {
            id: 10,
            message: "hello".to_string(),
            user: alice(),
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            temp_id: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "chat_message");
        assert_eq!(value["id"], 10);
        assert_eq!(value["message"], "hello");
        assert_eq!(value["user"]["username"], "alice");
        assert_eq!(value["timestamp"], "2024-05-01T12:00:00Z");
        assert!(value.get("temp_id").is_none());
    }

    #[test]
    fn test_presence_wire_shape() {
        let event = ServerEvent::Presence {
            online_users: vec![alice()],
            status: PresenceState::Offline,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "online_status");
        assert_eq!(value["status"], "offline");
        assert_eq!(value["online_users"][0]["id"], 1);
        assert_eq!(event.kind(), "online_status");
    }
}
