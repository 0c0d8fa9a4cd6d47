use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use super::{FeedbackUpdate, NotificationEvent};
use crate::auth::middleware::BearerIdentity;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedbackUpdateRequest {
    pub user_id: i64,
    pub feedback: FeedbackUpdate,
}

/// POST /api/internal/feedback-updates: push a feedback change to its owner.
/// Staff JWT required. Always 202: delivery is best-effort and not queued.
pub async fn post_feedback_update(
    State(state): State<AppState>,
    BearerIdentity(caller): BearerIdentity,
    Json(body): Json<FeedbackUpdateRequest>,
) -> StatusCode {
    if !caller.is_privileged() {
        tracing::warn!(user_id = caller.id, "Non-staff caller tried to push a feedback update");
        return StatusCode::FORBIDDEN;
    }

    state.notifications.publish(NotificationEvent::FeedbackUpdated {
        user_id: body.user_id,
        feedback: body.feedback,
    });

    StatusCode::ACCEPTED
}
