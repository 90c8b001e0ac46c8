// ============================
// glasscast-backend-lib/src/router.rs
// ============================
//! HTTP router.
use crate::handlers::{control, page, status, webhook};
use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(page::status_page))
        .route("/status/{user_id}", get(page::status_page))
        .route("/healthz", get(status::health))
        .route("/api/status/{user_id}", get(status::status_snapshot))
        .route("/api/status/{user_id}/events", get(status::status_events))
        .route("/api/stream/{user_id}/start", post(control::start_stream))
        .route("/api/stream/{user_id}/stop", post(control::stop_stream))
        .route("/api/sessions/{user_id}/stop", post(control::stop_session))
        .route("/api/tools/{user_id}/{tool_id}", post(control::run_tool))
        .route("/webhook/{user_id}/events", post(webhook::platform_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
