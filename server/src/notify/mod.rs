//! Server-initiated pushes into a user's personal notification group.
//!
//! The feedback workflow lives outside the relay. It publishes a
//! [`NotificationEvent`] after mutating a feedback record, either in-process
//! through [`NotificationDispatcher`] or over HTTP via [`ingress`].
//! Nothing is queued: a user with no open notification session misses the push
//! and reads the record on reconnect.

pub mod ingress;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::groups::{GroupBackend, GroupName};
use crate::ws::protocol::ServerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    Open,
    InProgress,
    Resolved,
}

/// Snapshot of a feedback record after an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackUpdate {
    pub id: i64,
    pub status: FeedbackStatus,
    #[serde(default)]
    pub admin_response: String,
    pub subject: String,
    #[serde(default)]
    pub message: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One-way events published by external workflows.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    FeedbackUpdated {
        user_id: i64,
        feedback: FeedbackUpdate,
    },
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    groups: Arc<dyn GroupBackend>,
}

impl NotificationDispatcher {
    pub fn new(groups: Arc<dyn GroupBackend>) -> Self {
        Self { groups }
    }

    pub fn publish(&self, event: NotificationEvent) {
        match event {
            NotificationEvent::FeedbackUpdated { user_id, feedback } => {
                let group = GroupName::user(user_id);
                tracing::info!(
                    user_id,
                    feedback_id = feedback.id,
                    online = self.groups.member_count(&group),
                    "Dispatching feedback update"
                );
                self.groups
                    .broadcast(&group, &ServerEvent::FeedbackUpdate { feedback });
            }
        }
    }

    pub fn dispatch_feedback_update(&self, user_id: i64, feedback: FeedbackUpdate) {
        self.publish(NotificationEvent::FeedbackUpdated { user_id, feedback });
    }
}
