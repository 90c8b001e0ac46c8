//! Shared fixtures: a scripted platform session and app state built around it.
#![allow(dead_code)]

use async_trait::async_trait;
use glasscast_backend::{
    config::Settings,
    error::CameraError,
    platform::{PlatformSession, SessionConnector, SessionHandle},
    AppState,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const RTMP_URL: &str = "rtmp://example/live/key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start(String),
    Stop,
    Show(String),
}

/// Platform session that records every call
pub struct FakeSession {
    id: String,
    calls: Mutex<Vec<Call>>,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
}

impl FakeSession {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            calls: Mutex::new(Vec::new()),
            fail_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
        })
    }

    pub fn failing_start(id: &str) -> Arc<Self> {
        let session = Self::new(id);
        session.fail_start.store(true, Ordering::SeqCst);
        session
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, wanted: fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|&c| wanted(c)).count()
    }
}

#[async_trait]
impl PlatformSession for FakeSession {
    fn session_id(&self) -> &str {
        &self.id
    }

    async fn start_stream(&self, rtmp_url: &str) -> Result<(), CameraError> {
        self.calls.lock().push(Call::Start(rtmp_url.to_string()));
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(CameraError::Rejected("camera denied".to_string()));
        }
        Ok(())
    }

    async fn stop_stream(&self) -> Result<(), CameraError> {
        self.calls.lock().push(Call::Stop);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(CameraError::Transport("timed out".to_string()));
        }
        Ok(())
    }

    async fn show_text(&self, text: &str) -> Result<(), CameraError> {
        self.calls.lock().push(Call::Show(text.to_string()));
        Ok(())
    }
}

/// Connector that hands out [`FakeSession`]s and remembers them
#[derive(Default)]
pub struct FakeConnector {
    sessions: Mutex<Vec<Arc<FakeSession>>>,
}

impl FakeConnector {
    pub fn last(&self) -> Option<Arc<FakeSession>> {
        self.sessions.lock().last().cloned()
    }
}

impl SessionConnector for FakeConnector {
    fn connect(&self, _user_id: &str, session_id: &str) -> SessionHandle {
        let session = FakeSession::new(session_id);
        self.sessions.lock().push(Arc::clone(&session));
        session
    }
}

pub fn test_settings() -> Settings {
    Settings::new(RTMP_URL)
}

pub fn setup() -> (Arc<AppState>, Arc<FakeConnector>) {
    let connector = Arc::new(FakeConnector::default());
    let state = AppState::with_connector(test_settings(), connector.clone());
    (Arc::new(state), connector)
}
