// ============================
// glasscast-backend-lib/src/platform.rs
// ============================
//! Seam to the smart-glasses platform.
//!
//! The platform owns the session lifecycle; this crate only holds handles to
//! it and receives its notifications as typed [`PlatformEvent`]s.
use async_trait::async_trait;
use glasscast_common::StreamStatusUpdate;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::{AppError, CameraError};

/// Capabilities of one live glasses connection
#[async_trait]
pub trait PlatformSession: Send + Sync {
    /// Platform-assigned session identifier
    fn session_id(&self) -> &str;

    /// Ask the glasses to stream the camera to `rtmp_url`
    async fn start_stream(&self, rtmp_url: &str) -> Result<(), CameraError>;

    /// Stop whatever unmanaged stream is running
    async fn stop_stream(&self) -> Result<(), CameraError>;

    /// Show a line of text on the glasses display
    async fn show_text(&self, text: &str) -> Result<(), CameraError>;
}

pub type SessionHandle = Arc<dyn PlatformSession>;

/// Builds handles for sessions announced through the webhook
pub trait SessionConnector: Send + Sync {
    fn connect(&self, user_id: &str, session_id: &str) -> SessionHandle;
}

/// Notifications that drive the session lifecycle
pub enum PlatformEvent {
    SessionStarted(SessionHandle),
    StatusChanged(StreamStatusUpdate),
    /// Raw battery payload, validated by [`battery_percent`]
    BatteryUpdated(Option<Value>),
    Disconnected { permanent: bool },
    StopRequested,
}

impl PlatformEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PlatformEvent::SessionStarted(_) => "session_started",
            PlatformEvent::StatusChanged(_) => "status_changed",
            PlatformEvent::BatteryUpdated(_) => "battery_updated",
            PlatformEvent::Disconnected { .. } => "disconnected",
            PlatformEvent::StopRequested => "stop_requested",
        }
    }
}

impl fmt::Debug for PlatformEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformEvent::SessionStarted(handle) => f
                .debug_tuple("SessionStarted")
                .field(&handle.session_id())
                .finish(),
            PlatformEvent::StatusChanged(update) => f.debug_tuple("StatusChanged").field(update).finish(),
            PlatformEvent::BatteryUpdated(raw) => f.debug_tuple("BatteryUpdated").field(raw).finish(),
            PlatformEvent::Disconnected { permanent } => f
                .debug_struct("Disconnected")
                .field("permanent", permanent)
                .finish(),
            PlatformEvent::StopRequested => f.write_str("StopRequested"),
        }
    }
}

/// Battery level in percent, or `None` for any payload that is not one.
///
/// Accepts a bare number, a numeric string such as `"87%"`, or an object
/// carrying `level` / `percent`.
pub fn battery_percent(raw: Option<&Value>) -> Option<u8> {
    let level = match raw? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        Value::Object(map) => map
            .get("level")
            .or_else(|| map.get("percent"))
            .and_then(Value::as_f64),
        _ => None,
    }?;

    if level.is_finite() && (0.0..=100.0).contains(&level) {
        Some(level.round() as u8)
    } else {
        None
    }
}

/// Session driven through the platform's HTTP session API
pub struct RemoteSession {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl RemoteSession {
    fn endpoint(&self, path: &str) -> String {
        format!("{}/sessions/{}/{}", self.base_url, self.session_id, path)
    }

    async fn post(&self, path: &str, body: Value) -> Result<(), CameraError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .json(&body)
            .send()
            .await
            .map_err(|e| CameraError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = response.text().await.unwrap_or_default();
        Err(CameraError::Rejected(format!("{status}: {}", detail.trim())))
    }
}

#[async_trait]
impl PlatformSession for RemoteSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn start_stream(&self, rtmp_url: &str) -> Result<(), CameraError> {
        self.post("stream/start", json!({ "rtmpUrl": rtmp_url })).await
    }

    async fn stop_stream(&self) -> Result<(), CameraError> {
        self.post("stream/stop", json!({})).await
    }

    async fn show_text(&self, text: &str) -> Result<(), CameraError> {
        self.post("display", json!({ "text": text })).await
    }
}

/// Connector for a platform reachable at `base_url`
pub struct RemoteConnector {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteConnector {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("cannot build platform client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl SessionConnector for RemoteConnector {
    fn connect(&self, _user_id: &str, session_id: &str) -> SessionHandle {
        Arc::new(RemoteSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            session_id: session_id.to_string(),
        })
    }
}

/// Session with no platform behind it; every call is logged and succeeds
pub struct DetachedSession {
    user_id: String,
    session_id: String,
}

impl DetachedSession {
    pub fn new(user_id: &str, session_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        }
    }
}

#[async_trait]
impl PlatformSession for DetachedSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn start_stream(&self, rtmp_url: &str) -> Result<(), CameraError> {
        info!(user_id = %self.user_id, session_id = %self.session_id, rtmp_url, "detached: start stream");
        Ok(())
    }

    async fn stop_stream(&self) -> Result<(), CameraError> {
        info!(user_id = %self.user_id, session_id = %self.session_id, "detached: stop stream");
        Ok(())
    }

    async fn show_text(&self, text: &str) -> Result<(), CameraError> {
        info!(user_id = %self.user_id, session_id = %self.session_id, text, "detached: show text");
        Ok(())
    }
}

/// Connector used when no platform API is configured
#[derive(Default)]
pub struct DetachedConnector;

impl SessionConnector for DetachedConnector {
    fn connect(&self, user_id: &str, session_id: &str) -> SessionHandle {
        Arc::new(DetachedSession::new(user_id, session_id))
    }
}
