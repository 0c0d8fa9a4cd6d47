use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use chrono::Utc;

use crate::db::models::Identity;
use crate::state::AppState;

/// Identity resolved from an `Authorization: Bearer` header.
/// Used by the HTTP ingress; WebSocket sessions authenticate via query param instead.
#[derive(Debug, Clone)]
pub struct BearerIdentity(pub Identity);

impl FromRequestParts<AppState> for BearerIdentity {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let identity = state
            .authenticator
            .authenticate(Some(token), Utc::now(), state.directory.as_ref())
            .await
            .map_err(|err| {
                tracing::debug!(error = %err, "Bearer authentication failed");
                StatusCode::UNAUTHORIZED
            })?;

        Ok(BearerIdentity(identity))
    }
}
