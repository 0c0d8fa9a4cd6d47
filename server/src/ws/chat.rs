//! Chat session: one connection bound to the `chat:{conversation_id}` group.

use async_trait::async_trait;
use axum::extract::ws::WebSocket;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::chat::broadcast::broadcast_chat_message;
use crate::chat::presence::{self, validate_receiver};
use crate::db::models::{Identity, MessageRecord};
use crate::groups::{GroupBackend, GroupName, MemberHandle};
use crate::persistence::{PersistenceError, PersistenceGateway};
use crate::state::AppState;
use crate::ws::actor::{self, FrameHandler};
use crate::ws::protocol::{ClientEvent, PresenceState};
use crate::ws::{Lifecycle, SessionState};

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Broadcast,
    Dropped,
}

pub struct ChatSession {
    lifecycle: Lifecycle,
    identity: Arc<Identity>,
    conversation_id: i64,
    group: GroupName,
    member: MemberHandle,
    groups: Arc<dyn GroupBackend>,
    persistence: Arc<dyn PersistenceGateway>,
    persist_timeout: Duration,
}

impl ChatSession {
    /// Register the member in the conversation's group and announce it online.
    /// `lifecycle` must be in `Joining`; the session comes back `Active`.
    pub fn join(
        mut lifecycle: Lifecycle,
        identity: Arc<Identity>,
        conversation_id: i64,
        member: MemberHandle,
        state: &AppState,
    ) -> Self {
        let group = GroupName::chat(conversation_id);
        state.groups.join(&group, member.clone());
        presence::announce(state.groups.as_ref(), &group, &identity, PresenceState::Online);
        lifecycle.advance(SessionState::Active);

        tracing::info!(
            user_id = identity.id,
            group = %group,
            connection_id = %member.id(),
            "Chat session active"
        );

        Self {
            lifecycle,
            identity,
            conversation_id,
            group,
            member,
            groups: state.groups.clone(),
            persistence: state.persistence.clone(),
            persist_timeout: state.settings.persist_timeout,
        }
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    pub fn group(&self) -> &GroupName {
        &self.group
    }

    /// Decode and dispatch one text frame. Never ends the session.
    pub async fn handle_text(&mut self, text: &str) -> FrameOutcome {
        match ClientEvent::decode(text) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => {
                tracing::debug!(user_id = self.identity.id, error = %e, "Dropping malformed frame");
                FrameOutcome::Dropped
            }
        }
    }

    pub async fn handle_event(&mut self, event: ClientEvent) -> FrameOutcome {
        if self.state() != SessionState::Active {
            return FrameOutcome::Dropped;
        }

        match event {
            ClientEvent::ChatMessage { message, temp_id } => {
                match self.persist(&message).await {
                    Ok(record) => {
                        broadcast_chat_message(
                            self.groups.as_ref(),
                            &self.group,
                            &record,
                            &self.identity,
                            temp_id,
                        );
                        FrameOutcome::Broadcast
                    }
                    Err(e) => {
                        tracing::warn!(
                            user_id = self.identity.id,
                            conversation_id = self.conversation_id,
                            error = %e,
                            "Error saving message, not broadcasting"
                        );
                        FrameOutcome::Dropped
                    }
                }
            }
            ClientEvent::Typing { receiver } => self.relay_typing(receiver.as_ref()),
            ClientEvent::Unrecognized(tag) => {
                tracing::debug!(user_id = self.identity.id, event_type = %tag, "Ignoring unknown event type");
                FrameOutcome::Dropped
            }
        }
    }

    async fn persist(&self, content: &str) -> Result<MessageRecord, PersistenceError> {
        let conversation_id = self.conversation_id;
        let sender_id = self.identity.id;
        let persistence = self.persistence.clone();

        tokio::time::timeout(self.persist_timeout, async move {
            persistence.get_conversation(conversation_id).await?;
            persistence
                .append_message(conversation_id, sender_id, content)
                .await
        })
        .await
        .map_err(|_| PersistenceError::Timeout)?
    }

    fn relay_typing(&self, receiver: Option<&Value>) -> FrameOutcome {
        match validate_receiver(&self.identity, receiver) {
            Ok(receiver_id) => {
                tracing::debug!(
                    user_id = self.identity.id,
                    receiver_id,
                    "{} is typing",
                    self.identity.username
                );
                presence::broadcast_typing(self.groups.as_ref(), &self.group, &self.identity, receiver_id);
                FrameOutcome::Broadcast
            }
            Err(rejection) => {
                tracing::debug!(user_id = self.identity.id, reason = %rejection, "Typing frame dropped");
                FrameOutcome::Dropped
            }
        }
    }

    /// Announce offline and leave the group. Runs at most once; safe after the socket is gone.
    pub fn close(&mut self) {
        if self.state() != SessionState::Active {
            return;
        }
        self.lifecycle.advance(SessionState::Closing);
        presence::announce(self.groups.as_ref(), &self.group, &self.identity, PresenceState::Offline);
        self.groups.leave(&self.group, &self.member);
        self.lifecycle.advance(SessionState::Closed);

        tracing::info!(
            user_id = self.identity.id,
            group = %self.group,
            connection_id = %self.member.id(),
            "Chat session closed"
        );
    }
}

#[async_trait]
impl FrameHandler for ChatSession {
    async fn on_text(&mut self, text: &str) {
        self.handle_text(text).await;
    }
}

impl Drop for ChatSession {
    // Covers task cancellation and panics in the relay loop.
    fn drop(&mut self) {
        self.close();
    }
}

/// Run an authenticated chat connection to completion.
pub async fn run(
    socket: WebSocket,
    state: AppState,
    lifecycle: Lifecycle,
    identity: Identity,
    conversation_id: i64,
) {
    let (member, outbound) = MemberHandle::channel();
    let mut session = ChatSession::join(
        lifecycle,
        Arc::new(identity),
        conversation_id,
        member.clone(),
        &state,
    );

    let reason = actor::drive(socket, &member, outbound, &state.settings, &mut session).await;
    tracing::debug!(group = %session.group(), reason = ?reason, "Chat connection ended");

    session.close();
}
