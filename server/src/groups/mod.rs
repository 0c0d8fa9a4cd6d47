//! Named broadcast domains and the backend that fans events out to them.
//!
//! Sessions reach other connections only through a [`GroupBackend`]. The
//! bundled backend is [`InProcessRegistry`]; a pub/sub backed implementation
//! can replace it for multi-process deployments.

pub mod registry;

use axum::extract::ws::Message;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ws::protocol::ServerEvent;

pub use registry::InProcessRegistry;

/// Sender half of a connection's outbound queue.
/// Anything holding a clone can push frames to that client.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Unique per connection, so one user's tabs are distinct members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("connection {0} is gone")]
    Disconnected(ConnectionId),
}

/// Handle a backend uses to reach one live connection.
#[derive(Debug, Clone)]
pub struct MemberHandle {
    id: ConnectionId,
    sender: ConnectionSender,
}

impl MemberHandle {
    /// Create a handle and the receiver its connection's writer drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (sender, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: ConnectionId::new(),
                sender,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn sender(&self) -> &ConnectionSender {
        &self.sender
    }

    /// Queue a frame without waiting on the socket.
    pub fn deliver(&self, frame: Message) -> Result<(), DeliveryError> {
        self.sender
            .send(frame)
            .map_err(|_| DeliveryError::Disconnected(self.id))
    }
}

/// Group name: `chat:{conversation_id}` or `user:{user_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupName(String);

impl GroupName {
    pub fn chat(conversation_id: i64) -> Self {
        Self(format!("chat:{}", conversation_id))
    }

    pub fn user(user_id: i64) -> Self {
        Self(format!("user:{}", user_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Group membership and fan-out.
///
/// All calls are non-blocking. `join` and `leave` are idempotent, and a
/// broadcast to a group with no members is a silent no-op. Per-member delivery
/// failures are handled inside the backend and never reach the caller.
pub trait GroupBackend: Send + Sync {
    fn join(&self, group: &GroupName, member: MemberHandle);

    fn leave(&self, group: &GroupName, member: &MemberHandle);

    fn broadcast(&self, group: &GroupName, event: &ServerEvent);

    /// Current number of members in a group (0 if it does not exist).
    fn member_count(&self, group: &GroupName) -> usize;
}
