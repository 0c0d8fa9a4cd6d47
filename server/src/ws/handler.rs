use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::AuthError;
use crate::db::models::Identity;
use crate::state::AppState;
use crate::ws::{chat, notifications, Lifecycle, SessionState};

/// Query parameters for WebSocket connections: `?token=JWT`.
/// Missing is allowed here so it can be reported with its own close code.
#[derive(Debug, Default, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// GET /ws/chat/{conversation_id}?token=JWT
pub async fn chat_upgrade(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let mut lifecycle = Lifecycle::new("chat");
    match authenticate(&state, &mut lifecycle, params.token.as_deref()).await {
        Ok(identity) => {
            tracing::info!(
                user_id = identity.id,
                conversation_id,
                "Chat connection authenticated"
            );
            ws.on_upgrade(move |socket| chat::run(socket, state, lifecycle, identity, conversation_id))
        }
        Err(err) => reject(ws, lifecycle, err),
    }
}

/// GET /ws/notifications?token=JWT
pub async fn notifications_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let mut lifecycle = Lifecycle::new("notifications");
    match authenticate(&state, &mut lifecycle, params.token.as_deref()).await {
        Ok(identity) => {
            tracing::info!(user_id = identity.id, "Notification connection authenticated");
            ws.on_upgrade(move |socket| notifications::run(socket, state, lifecycle, identity))
        }
        Err(err) => reject(ws, lifecycle, err),
    }
}

/// Connecting -> Authenticating -> Joining on success.
async fn authenticate(
    state: &AppState,
    lifecycle: &mut Lifecycle,
    token: Option<&str>,
) -> Result<Identity, AuthError> {
    lifecycle.advance(SessionState::Authenticating);
    let identity = state
        .authenticator
        .authenticate(token, Utc::now(), state.directory.as_ref())
        .await?;
    lifecycle.advance(SessionState::Joining);
    Ok(identity)
}

/// Upgrade, then immediately close with the failure's close code.
/// The connection never reaches a group.
fn reject(ws: WebSocketUpgrade, mut lifecycle: Lifecycle, err: AuthError) -> Response {
    tracing::warn!(
        close_code = err.close_code(),
        reason = err.reason(),
        "WebSocket auth failed"
    );
    lifecycle.advance(SessionState::Closing);

    ws.on_upgrade(move |mut socket| async move {
        let close_frame = CloseFrame {
            code: err.close_code(),
            reason: err.reason().into(),
        };
        let _ = socket.send(Message::Close(Some(close_frame))).await;
        lifecycle.advance(SessionState::Closed);
    })
}
