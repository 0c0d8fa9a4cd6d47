use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{IdentityDirectory, PersistenceError, PersistenceGateway};
use crate::db::models::{ConversationRef, Identity, MessageRecord};
use crate::db::DbPool;

/// SQLite-backed implementation of both collaborator traits.
#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Insert a user. The account service owns passwords; the relay only needs the public fields.
    pub fn create_user(
        &self,
        username: &str,
        is_staff: bool,
        is_superuser: bool,
    ) -> Result<Identity, PersistenceError> {
        let conn = self
            .db
            .lock()
            .map_err(|e| PersistenceError::Storage(format!("DB lock error: {}", e)))?;
        conn.execute(
            "INSERT INTO users (username, is_staff, is_superuser, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![username, is_staff, is_superuser, Utc::now().to_rfc3339()],
        )?;
        Ok(Identity {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            is_staff,
            is_superuser,
        })
    }

    /// Create a conversation between the given users.
    pub fn create_conversation(&self, participants: &[i64]) -> Result<ConversationRef, PersistenceError> {
        let mut conn = self
            .db
            .lock()
            .map_err(|e| PersistenceError::Storage(format!("DB lock error: {}", e)))?;
        let created_at = Utc::now();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO conversations (created_at) VALUES (?1)",
            [created_at.to_rfc3339()],
        )?;
        let id = tx.last_insert_rowid();
        for user_id in participants {
            tx.execute(
                "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id) VALUES (?1, ?2)",
                rusqlite::params![id, user_id],
            )?;
        }
        tx.commit()?;
        Ok(ConversationRef { id, created_at })
    }

    /// Number of stored messages in a conversation.
    pub fn message_count(&self, conversation_id: i64) -> Result<i64, PersistenceError> {
        let conn = self
            .db
            .lock()
            .map_err(|e| PersistenceError::Storage(format!("DB lock error: {}", e)))?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            [conversation_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Storage(format!("bad timestamp {:?}: {}", raw, e)))
}

fn lookup_conversation(
    conn: &rusqlite::Connection,
    conversation_id: i64,
) -> Result<ConversationRef, PersistenceError> {
    let created_at: String = match conn.query_row(
        "SELECT created_at FROM conversations WHERE id = ?1",
        [conversation_id],
        |row| row.get(0),
    ) {
        Ok(v) => v,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(PersistenceError::ConversationNotFound(conversation_id))
        }
        Err(e) => return Err(e.into()),
    };
    Ok(ConversationRef {
        id: conversation_id,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait]
impl PersistenceGateway for SqliteStore {
    async fn append_message(
        &self,
        conversation_id: i64,
        sender_id: i64,
        content: &str,
    ) -> Result<MessageRecord, PersistenceError> {
        let db = self.db.clone();
        let content = content.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| PersistenceError::Storage(format!("DB lock error: {}", e)))?;

            lookup_conversation(&conn, conversation_id)?;

            let timestamp = Utc::now();
            conn.execute(
                "INSERT INTO messages (conversation_id, sender_id, content, timestamp) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![conversation_id, sender_id, content, timestamp.to_rfc3339()],
            )?;

            Ok(MessageRecord {
                id: conn.last_insert_rowid(),
                conversation_id,
                sender_id,
                content,
                timestamp,
            })
        })
        .await
        .map_err(|e| PersistenceError::TaskJoin(e.to_string()))?
    }

    async fn get_conversation(
        &self,
        conversation_id: i64,
    ) -> Result<ConversationRef, PersistenceError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| PersistenceError::Storage(format!("DB lock error: {}", e)))?;
            lookup_conversation(&conn, conversation_id)
        })
        .await
        .map_err(|e| PersistenceError::TaskJoin(e.to_string()))?
    }
}

#[async_trait]
impl IdentityDirectory for SqliteStore {
    async fn resolve_user(&self, user_id: i64) -> Result<Identity, PersistenceError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| PersistenceError::Storage(format!("DB lock error: {}", e)))?;
            match conn.query_row(
                "SELECT id, username, is_staff, is_superuser FROM users WHERE id = ?1",
                [user_id],
                |row| {
                    Ok(Identity {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        is_staff: row.get(2)?,
                        is_superuser: row.get(3)?,
                    })
                },
            ) {
                Ok(identity) => Ok(identity),
                Err(rusqlite::Error::QueryReturnedNoRows) => Err(PersistenceError::UserNotFound(user_id)),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(|e| PersistenceError::TaskJoin(e.to_string()))?
    }
}
