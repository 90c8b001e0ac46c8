// ============================
// crates/backend-lib/src/handlers/control.rs
// ============================
//! Stream control and tool-call endpoints.
use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use glasscast_common::{CommandReply, StartStreamRequest};
use std::sync::Arc;

use super::validate_user_id;
use crate::commands::{self, NOTHING_TO_STOP_REPLY, STOPPED_REPLY};
use crate::controller::StopOutcome;
use crate::platform::PlatformEvent;
use crate::{error::AppError, AppState};

/// `POST /api/stream/{user_id}/start`, body optionally `{"rtmpUrl": "..."}`
pub async fn start_stream(
    Path(user_id): Path<String>,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<CommandReply>, AppError> {
    validate_user_id(&user_id)?;
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        StartStreamRequest::default()
    } else {
        serde_json::from_slice::<StartStreamRequest>(&body)?
    };

    if let Some(url) = &request.rtmp_url {
        if !(url.starts_with("rtmp://") || url.starts_with("rtmps://")) {
            return Err(AppError::InvalidInput(format!("not an RTMP URL: {url}")));
        }
    }

    let url = state
        .controller
        .start_stream(&user_id, request.rtmp_url.as_deref())
        .await?;
    Ok(Json(CommandReply::ok(format!("Streaming to {url}"))))
}

/// `POST /api/stream/{user_id}/stop`; stopping nothing is a success
pub async fn stop_stream(
    Path(user_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CommandReply>, AppError> {
    validate_user_id(&user_id)?;
    let reply = match state.controller.stop_stream(&user_id).await? {
        StopOutcome::Stopped => CommandReply::ok(STOPPED_REPLY),
        StopOutcome::NothingToStop => CommandReply::ok(NOTHING_TO_STOP_REPLY),
    };
    Ok(Json(reply))
}

/// `POST /api/sessions/{user_id}/stop`: end the session regardless of transport state
pub async fn stop_session(
    Path(user_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CommandReply>, AppError> {
    validate_user_id(&user_id)?;
    state
        .controller
        .dispatch(&user_id, PlatformEvent::StopRequested)
        .await;
    Ok(Json(CommandReply::ok("Session ended.")))
}

/// `POST /api/tools/{user_id}/{tool_id}`
pub async fn run_tool(
    Path((user_id, tool_id)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CommandReply>, AppError> {
    validate_user_id(&user_id)?;
    commands::handle_tool_call(&state.controller, &user_id, &tool_id)
        .await
        .map(Json)
        .ok_or(AppError::UnsupportedCommand(tool_id))
}
