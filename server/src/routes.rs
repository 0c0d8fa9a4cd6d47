use axum::Router;

use crate::notify::ingress;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router.
pub fn build_router(state: AppState) -> Router {
    // WebSocket endpoints (auth via query param, not header)
    let ws_routes = Router::new()
        .route(
            "/ws/chat/{conversation_id}",
            axum::routing::get(ws_handler::chat_upgrade),
        )
        .route(
            "/ws/chat/{conversation_id}/",
            axum::routing::get(ws_handler::chat_upgrade),
        )
        .route(
            "/ws/notifications",
            axum::routing::get(ws_handler::notifications_upgrade),
        )
        .route(
            "/ws/notifications/",
            axum::routing::get(ws_handler::notifications_upgrade),
        );

    // Ingress for the external feedback workflow (staff JWT required)
    let internal_routes = Router::new().route(
        "/api/internal/feedback-updates",
        axum::routing::post(ingress::post_feedback_update),
    );

    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(ws_routes)
        .merge(internal_routes)
        .merge(health)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
