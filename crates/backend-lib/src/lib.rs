// ============================
// glasscast-backend-lib/src/lib.rs
// ============================
//! Live status of smart-glasses RTMP streams, pushed to browsers over SSE.
//!
//! Platform notifications and tool commands go through the
//! [`controller::SessionController`], which updates the user's stream record
//! and fans the formatted status out to every open viewer via the
//! [`hub::BroadcastHub`].

pub mod commands;
pub mod config;
pub mod controller;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod metrics;
pub mod platform;
pub mod registry;
pub mod router;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::controller::SessionController;
use crate::error::AppError;
use crate::platform::{DetachedConnector, RemoteConnector, SessionConnector};

const PLATFORM_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state shared across all handlers
pub struct AppState {
    /// Settings the process started with
    pub settings: Arc<Settings>,
    /// Session lifecycle controller
    pub controller: SessionController,
    /// Builds platform handles for announced sessions
    pub connector: Arc<dyn SessionConnector>,
}

impl AppState {
    /// Create application state, talking to the platform API when one is configured
    pub fn new(settings: Settings) -> Result<Self, AppError> {
        let connector: Arc<dyn SessionConnector> = match &settings.platform_api_url {
            Some(base) => Arc::new(RemoteConnector::new(base, PLATFORM_TIMEOUT)?),
            None => {
                tracing::warn!("platform_api_url not set, camera calls are only logged");
                Arc::new(DetachedConnector)
            },
        };
        Ok(Self::with_connector(settings, connector))
    }

    /// Create application state with a caller-provided connector
    pub fn with_connector(settings: Settings, connector: Arc<dyn SessionConnector>) -> Self {
        let controller = SessionController::from_settings(&settings);
        Self {
            settings: Arc::new(settings),
            controller,
            connector,
        }
    }
}
