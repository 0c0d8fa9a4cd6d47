//! Chat message fan-out.

use serde_json::Value;

use crate::db::models::{Identity, MessageRecord};
use crate::groups::{GroupBackend, GroupName};
use crate::ws::protocol::ServerEvent;

/// Build the outbound event for a stored message.
pub fn chat_message_event(record: &MessageRecord, sender: &Identity, temp_id: Option<Value>) -> ServerEvent {
    ServerEvent::ChatMessage {
        id: record.id,
        message: record.content.clone(),
        user: sender.clone(),
        timestamp: record.timestamp,
        temp_id,
    }
}

/// Broadcast a stored message to every member of its chat group.
pub fn broadcast_chat_message(
    groups: &dyn GroupBackend,
    group: &GroupName,
    record: &MessageRecord,
    sender: &Identity,
    temp_id: Option<Value>,
) {
    groups.broadcast(group, &chat_message_event(record, sender, temp_id));
}
