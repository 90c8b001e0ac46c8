// ================
// common/src/lib.rs
// ================
//! Common types shared between the `glasscast` server and its status viewers.
//! This module defines the status payload pushed over SSE and the
//! notification shapes the smart-glasses platform posts to the webhook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a glasses user, as assigned by the platform
pub type UserId = String;

/// Which streaming mode, if any, is active for a user
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    /// Nothing is streaming
    #[default]
    None,
    /// Platform-brokered destination
    Managed,
    /// Operator-supplied RTMP destination
    Unmanaged,
}

/// Status object delivered to every viewer of a user
///
/// Absent fields are serialized as `null` so viewers can always read every key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    /// Whether the user currently has a live glasses session
    pub has_session: bool,
    pub stream_type: Option<StreamType>,
    /// Opaque status token reported by the platform (`idle`, `starting`, `active`, ...)
    pub status: Option<String>,
    pub rtmp_url: Option<String>,
    pub stream_id: Option<String>,
    pub hls_url: Option<String>,
    pub dash_url: Option<String>,
    /// Human-readable error, only set while `status == "error"`
    pub error_detail: Option<String>,
    pub battery_percent: Option<u8>,
    /// When the record behind this payload last changed
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusPayload {
    /// Canonical payload for a user without an active session
    pub fn no_session() -> Self {
        Self {
            has_session: false,
            stream_type: None,
            status: None,
            rtmp_url: None,
            stream_id: None,
            hls_url: None,
            dash_url: None,
            error_detail: None,
            battery_percent: None,
            updated_at: None,
        }
    }
}

/// Stream status change as reported by the platform
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatusUpdate {
    pub status: String,
    #[serde(default)]
    pub stream_id: Option<String>,
    #[serde(default)]
    pub error_details: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Notifications posted by the platform to `/webhook/{user_id}/events`
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PlatformNotification {
    /// A glasses session was opened for the user
    SessionStarted {
        session_id: String,
    },
    /// Camera stream status changed
    StreamStatus(StreamStatusUpdate),
    /// Battery level update; `level` is kept raw and validated server-side
    Battery {
        #[serde(default)]
        level: Option<serde_json::Value>,
    },
    /// Connection to the glasses dropped
    Disconnected {
        #[serde(default)]
        permanent: bool,
    },
    /// An operator asked the platform to end the session
    StopRequested,
    /// Speech transcription from the glasses microphone
    Transcription {
        text: String,
        #[serde(default)]
        is_final: bool,
    },
}

/// Body of the start-stream control endpoint
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartStreamRequest {
    /// Destination override; the configured URL is used when absent
    #[serde(default)]
    pub rtmp_url: Option<String>,
}

/// Acknowledgement returned by tool commands and control endpoints
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    /// Whether the command took effect
    pub ok: bool,
    /// Short human-readable text suitable for voice feedback
    pub message: String,
}

impl CommandReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { ok: true, message: message.into() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { ok: false, message: message.into() }
    }
}
