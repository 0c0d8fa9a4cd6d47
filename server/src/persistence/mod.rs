//! Collaborator interfaces the relay consumes.
//!
//! Durable storage and the user directory live outside the relay; sessions
//! only see these traits. `SqliteStore` is the bundled single-node adapter.

pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::{ConversationRef, Identity, MessageRecord};

pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("conversation {0} not found")]
    ConversationNotFound(i64),

    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("persistence call timed out")]
    Timeout,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("task join error: {0}")]
    TaskJoin(String),
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(e: rusqlite::Error) -> Self {
        PersistenceError::Storage(e.to_string())
    }
}

/// Append-only write path for chat messages.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Store a message and return the created record (id and timestamp are server-assigned).
    async fn append_message(
        &self,
        conversation_id: i64,
        sender_id: i64,
        content: &str,
    ) -> Result<MessageRecord, PersistenceError>;

    async fn get_conversation(
        &self,
        conversation_id: i64,
    ) -> Result<ConversationRef, PersistenceError>;
}

/// Resolves a verified token subject to a full identity.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn resolve_user(&self, user_id: i64) -> Result<Identity, PersistenceError>;
}
