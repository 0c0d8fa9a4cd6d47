//! Notification session: one connection in the user's private `user:{id}` group.
//! Only server-initiated traffic flows here, so there is no presence.

use async_trait::async_trait;
use axum::extract::ws::WebSocket;
use std::sync::Arc;

use crate::db::models::Identity;
use crate::groups::{GroupBackend, GroupName, MemberHandle};
use crate::state::AppState;
use crate::ws::actor::{self, FrameHandler};
use crate::ws::{Lifecycle, SessionState};

pub struct NotificationSession {
    lifecycle: Lifecycle,
    identity: Arc<Identity>,
    group: GroupName,
    member: MemberHandle,
    groups: Arc<dyn GroupBackend>,
}

impl NotificationSession {
    /// `lifecycle` must be in `Joining`; the session comes back `Active`.
    pub fn join(mut lifecycle: Lifecycle, identity: Arc<Identity>, member: MemberHandle, state: &AppState) -> Self {
        let group = GroupName::user(identity.id);
        state.groups.join(&group, member.clone());
        lifecycle.advance(SessionState::Active);

        tracing::info!(
            user_id = identity.id,
            connection_id = %member.id(),
            devices = state.groups.member_count(&group),
            "Notification session active"
        );

        Self {
            lifecycle,
            identity,
            group,
            member,
            groups: state.groups.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    pub fn close(&mut self) {
        if self.state() != SessionState::Active {
            return;
        }
        self.lifecycle.advance(SessionState::Closing);
        self.groups.leave(&self.group, &self.member);
        self.lifecycle.advance(SessionState::Closed);

        tracing::info!(
            user_id = self.identity.id,
            connection_id = %self.member.id(),
            "Notification session closed"
        );
    }
}

#[async_trait]
impl FrameHandler for NotificationSession {
    async fn on_text(&mut self, text: &str) {
        tracing::debug!(
            user_id = self.identity.id,
            bytes = text.len(),
            "Ignoring client frame on notification channel"
        );
    }
}

impl Drop for NotificationSession {
    fn drop(&mut self) {
        self.close();
    }
}

pub async fn run(socket: WebSocket, state: AppState, lifecycle: Lifecycle, identity: Identity) {
    let (member, outbound) = MemberHandle::channel();
    let mut session = NotificationSession::join(lifecycle, Arc::new(identity), member.clone(), &state);

    let reason = actor::drive(socket, &member, outbound, &state.settings, &mut session).await;
    tracing::debug!(user_id = session.identity.id, reason = ?reason, "Notification connection ended");

    session.close();
}
