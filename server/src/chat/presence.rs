//! Presence and typing indicators derived from session activity.
//!
//! Presence is not stored anywhere: a session announces `online` right after
//! joining its chat group and `offline` right before leaving it.

use serde_json::Value;
use thiserror::Error;

use crate::db::models::Identity;
use crate::groups::{GroupBackend, GroupName};
use crate::ws::protocol::{PresenceState, ServerEvent};

/// Broadcast a presence change for one identity to a chat group.
pub fn announce(groups: &dyn GroupBackend, group: &GroupName, identity: &Identity, state: PresenceState) {
    let event = ServerEvent::Presence {
        online_users: vec![identity.clone()],
        status: state,
    };
    groups.broadcast(group, &event);

    tracing::debug!(
        group = %group,
        user_id = identity.id,
        status = ?state,
        "Presence announced"
    );
}

/// Why a typing frame was dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypingRejection {
    #[error("no receiver provided")]
    MissingReceiver,

    #[error("receiver is not a user id: {0}")]
    InvalidReceiver(String),

    #[error("sender is typing to themselves")]
    SelfTyping,
}

/// Validate the raw `receiver` field of a typing frame.
/// Accepts integers, floats (truncated) and numeric strings.
pub fn validate_receiver(sender: &Identity, receiver: Option<&Value>) -> Result<i64, TypingRejection> {
    let receiver = match receiver {
        None | Some(Value::Null) => return Err(TypingRejection::MissingReceiver),
        Some(v) => v,
    };

    let receiver_id = match receiver {
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i,
            (None, Some(f)) if f.is_finite() => f.trunc() as i64,
            _ => return Err(TypingRejection::InvalidReceiver(n.to_string())),
        },
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| TypingRejection::InvalidReceiver(s.clone()))?,
        other => return Err(TypingRejection::InvalidReceiver(other.to_string())),
    };

    if receiver_id == sender.id {
        return Err(TypingRejection::SelfTyping);
    }

    Ok(receiver_id)
}

/// Broadcast a typing indicator from `sender` addressed to `receiver_id`.
pub fn broadcast_typing(groups: &dyn GroupBackend, group: &GroupName, sender: &Identity, receiver_id: i64) {
    let event = ServerEvent::Typing {
        user: sender.clone(),
        receiver: receiver_id,
        is_typing: true,
    };
    groups.broadcast(group, &event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sender() -> Identity {
        Identity {
            id: 5,
            username: "sam".to_string(),
            is_staff: false,
            is_superuser: false,
        }
    }

    #[test]
    fn test_receiver_forms() {
        let s = sender();
        assert_eq!(validate_receiver(&s, Some(&json!(9))), Ok(9));
        assert_eq!(validate_receiver(&s, Some(&json!(9.7))), Ok(9));
        assert_eq!(validate_receiver(&s, Some(&json!("12"))), Ok(12));
        assert_eq!(validate_receiver(&s, Some(&json!(" 12 "))), Ok(12));
    }

    #[test]
    fn test_receiver_rejections() {
        let s = sender();
        assert_eq!(validate_receiver(&s, None), Err(TypingRejection::MissingReceiver));
        assert_eq!(
            validate_receiver(&s, Some(&Value::Null)),
            Err(TypingRejection::MissingReceiver)
        );
        assert_eq!(validate_receiver(&s, Some(&json!(5))), Err(TypingRejection::SelfTyping));
        assert_eq!(validate_receiver(&s, Some(&json!("5"))), Err(TypingRejection::SelfTyping));
        assert!(matches!(
            validate_receiver(&s, Some(&json!("bob"))),
            Err(TypingRejection::InvalidReceiver(_))
        ));
        assert!(matches!(
            validate_receiver(&s, Some(&json!([1]))),
            Err(TypingRejection::InvalidReceiver(_))
        ));
        assert!(matches!(
            validate_receiver(&s, Some(&json!(true))),
            Err(TypingRejection::InvalidReceiver(_))
        ));
    }
}
