//! Row types for the relay database.
//! These correspond 1:1 to the SQLite schema defined in migrations.rs.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated user as seen by the relay.
/// Serialized as the `user` object inside outbound envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl Identity {
    /// Staff and superusers may push feedback updates.
    pub fn is_privileged(&self) -> bool {
        self.is_staff || self.is_superuser
    }
}

/// Conversation row (participants live in conversation_participants)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRef {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

/// Stored chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}
