// ============================
// crates/backend-lib/src/handlers/webhook.rs
// ============================
//! Platform notifications.
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use glasscast_common::PlatformNotification;
use std::sync::Arc;
use tracing::debug;

use super::validate_user_id;
use crate::commands;
use crate::platform::PlatformEvent;
use crate::{error::AppError, AppState};

/// `POST /webhook/{user_id}/events`
pub async fn platform_webhook(
    Path(user_id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(notification): Json<PlatformNotification>,
) -> Result<StatusCode, AppError> {
    validate_user_id(&user_id)?;
    let controller = &state.controller;

    let event = match notification {
        PlatformNotification::SessionStarted { session_id } => {
            PlatformEvent::SessionStarted(state.connector.connect(&user_id, &session_id))
        },
        PlatformNotification::StreamStatus(update) => PlatformEvent::StatusChanged(update),
        PlatformNotification::Battery { level } => PlatformEvent::BatteryUpdated(level),
        PlatformNotification::Disconnected { permanent } => PlatformEvent::Disconnected { permanent },
        PlatformNotification::StopRequested => PlatformEvent::StopRequested,
        PlatformNotification::Transcription { text, is_final } => {
            if is_final {
                commands::handle_transcript(controller, &user_id, &text).await;
            } else {
                debug!(user_id, "interim transcript ignored");
            }
            return Ok(StatusCode::ACCEPTED);
        },
    };

    controller.dispatch(&user_id, event).await;
    Ok(StatusCode::ACCEPTED)
}
