// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No active session for user {0}")]
    NoActiveSession(String),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures reported by the platform when driving the glasses camera
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("platform rejected the request: {0}")]
    Rejected(String),

    #[error("platform unreachable: {0}")]
    Transport(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NoActiveSession(_) => StatusCode::CONFLICT,
            AppError::UnsupportedCommand(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Camera(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_001",
            AppError::NoActiveSession(_) => "SESSION_001",
            AppError::Camera(_) => "CAMERA_001",
            AppError::UnsupportedCommand(_) => "UNSUPPORTED_COMMAND",
            AppError::InvalidInput(_) => "VAL_001",
            AppError::Json(_) => "JSON_001",
            AppError::Internal(_) => "INT_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Config(_) | AppError::Internal(_) => {
                "An internal server error occurred".to_string()
            },
            AppError::NoActiveSession(_) => "No active glasses session".to_string(),
            AppError::Camera(_) => "The glasses platform could not complete the request".to_string(),
            AppError::UnsupportedCommand(_) => "Unsupported command".to_string(),
            AppError::InvalidInput(_) => "Invalid input provided".to_string(),
            AppError::Json(_) => "Invalid request format".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}
