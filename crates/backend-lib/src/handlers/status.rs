// ============================
// crates/backend-lib/src/handlers/status.rs
// ============================
//! Status snapshot, status event stream and health.
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::{Stream, StreamExt};
use glasscast_common::StatusPayload;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, warn};

use super::validate_user_id;
use crate::{error::AppError, AppState};

/// SSE event name carrying a status payload
pub const STATUS_EVENT: &str = "status";

/// `GET /api/status/{user_id}`
pub async fn status_snapshot(
    Path(user_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusPayload>, AppError> {
    validate_user_id(&user_id)?;
    Ok(Json(state.controller.status(&user_id).await))
}

/// `GET /api/status/{user_id}/events`
///
/// The first event is the status at connect time, then one event per push.
/// The subscription ends when the client goes away and the stream is dropped.
pub async fn status_events(
    Path(user_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    validate_user_id(&user_id)?;
    debug!(user_id, "status viewer connected");

    let events = state
        .controller
        .subscribe(&user_id)
        .await
        .map(|payload| Ok(status_event(&payload)));

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(state.settings.keep_alive())
            .text("keep-alive"),
    ))
}

fn status_event(payload: &StatusPayload) -> Event {
    match Event::default().event(STATUS_EVENT).json_data(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "failed to encode status event");
            Event::default().event("error").data("status unavailable")
        },
    }
}

/// `GET /healthz`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.controller.registry().len(),
        "viewers": state.controller.hub().total_subscribers(),
    }))
}
