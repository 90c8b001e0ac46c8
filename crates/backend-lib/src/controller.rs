// ============================
// glasscast-backend-lib/src/controller.rs
// ============================
//! Session lifecycle controller.
//!
//! Reacts to platform events, tool commands and control calls. Every entry
//! point takes the user's state slot, mutates the record, formats it and
//! pushes the result to the user's viewers before releasing the slot, so
//! viewers observe one payload per transition in processing order.
//!
//! Per user:
//! `Uninitialized -> Starting -> Active | Error | Timeout -> ... -> Ended`
//! where only a permanent disconnect or an explicit stop reaches `Ended`.
use dashmap::DashMap;
use futures_util::Stream;
use glasscast_common::{StatusPayload, StreamStatusUpdate, StreamType, UserId};
use metrics::counter;
use serde_json::Value;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::AppError;
use crate::hub::{BroadcastHub, Subscription};
use crate::metrics::CAMERA_FAILURES;
use crate::platform::{battery_percent, PlatformEvent, SessionHandle};
use crate::registry::SessionRegistry;
use crate::state::{format_status, StateStore, StreamState, STATUS_ERROR, STATUS_IDLE, STATUS_STARTING};

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// No unmanaged stream was running; nothing was touched
    NothingToStop,
}

/// Owns the registry, the state store and the hub for the process lifetime
#[derive(Clone)]
pub struct SessionController {
    registry: SessionRegistry,
    hub: BroadcastHub,
    store: StateStore,
    rtmp_url: Arc<str>,
    reconnect_grace: Option<Duration>,
    /// Stamp of the latest event per live session, used to cancel stale
    /// reconnect-grace timers. Stamps are unique across users and sessions.
    epochs: Arc<DashMap<UserId, u64>>,
    next_epoch: Arc<AtomicU64>,
}

impl SessionController {
    pub fn new(rtmp_url: &str, hub: BroadcastHub, reconnect_grace: Option<Duration>) -> Self {
        Self {
            registry: SessionRegistry::new(),
            hub,
            store: StateStore::new(),
            rtmp_url: Arc::from(rtmp_url),
            reconnect_grace,
            epochs: Arc::new(DashMap::new()),
            next_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.rtmp_url,
            BroadcastHub::new(settings.subscriber_buffer),
            settings.reconnect_grace(),
        )
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Destination used when a start request names none
    pub fn rtmp_url(&self) -> &str {
        &self.rtmp_url
    }

    /// Apply one platform event to the user's state machine
    pub async fn dispatch(&self, user_id: &str, event: PlatformEvent) {
        let epoch = self.bump_epoch(user_id, &event);
        debug!(user_id, event = event.name(), "platform event");

        match event {
            PlatformEvent::SessionStarted(handle) => self.session_started(user_id, handle).await,
            PlatformEvent::StatusChanged(update) => self.status_changed(user_id, update).await,
            PlatformEvent::BatteryUpdated(raw) => self.battery_updated(user_id, raw).await,
            PlatformEvent::Disconnected { permanent: true } => {
                self.end_session(user_id, "permanent disconnect", None).await;
            },
            PlatformEvent::Disconnected { permanent: false } => {
                debug!(user_id, "transient disconnect ignored");
                if let (Some(grace), Some(epoch)) = (self.reconnect_grace, epoch) {
                    self.arm_reconnect_grace(user_id, grace, epoch);
                }
            },
            PlatformEvent::StopRequested => self.end_session(user_id, "stop requested", None).await,
        }
    }

    async fn session_started(&self, user_id: &str, handle: SessionHandle) {
        info!(user_id, session_id = handle.session_id(), "session started");

        // Registry and record change together under the slot lock
        let slot = self.store.slot(user_id);
        let mut record = slot.lock().await;
        if self.registry.put(user_id, Arc::clone(&handle)).is_some() {
            debug!(user_id, "replaced previous session handle");
        }
        let state = record.insert(StreamState::new());

        match handle.start_stream(&self.rtmp_url).await {
            Ok(()) => {
                state.stream_type = StreamType::Unmanaged;
                state.status = STATUS_STARTING.to_string();
                state.rtmp_url = Some(self.rtmp_url.to_string());
            },
            Err(e) => {
                warn!(user_id, error = %e, "default stream start failed");
                counter!(CAMERA_FAILURES).increment(1);
                state.status = STATUS_ERROR.to_string();
                state.error_detail = Some(e.to_string());
            },
        }
        state.touch();
        self.push(user_id, Some(&*state));
        drop(record);

        if let Err(e) = handle.show_text("Streaming to RTMP destination").await {
            debug!(user_id, error = %e, "could not update glasses display");
        }
    }

    async fn status_changed(&self, user_id: &str, update: StreamStatusUpdate) {
        let rtmp_url = &self.rtmp_url;
        let applied = self
            .update_record(user_id, |state| {
                state.error_detail = if update.status == STATUS_ERROR {
                    update.error_details
                } else {
                    None
                };
                state.status = update.status;
                state.stream_id = update.stream_id;
                state.hls_url = None;
                state.dash_url = None;
                if state.rtmp_url.is_none() {
                    state.rtmp_url = Some(rtmp_url.to_string());
                }
            })
            .await;
        if !applied {
            debug!(user_id, "status for user without session ignored");
        }
    }

    async fn battery_updated(&self, user_id: &str, raw: Option<Value>) {
        let percent = battery_percent(raw.as_ref());
        if percent.is_none() {
            debug!(user_id, ?raw, "battery payload not understood");
        }
        self.update_record(user_id, |state| state.battery_percent = percent).await;
    }

    /// Mutate the user's record and push it; `false` if the user has none
    async fn update_record(&self, user_id: &str, apply: impl FnOnce(&mut StreamState)) -> bool {
        let slot = self.store.slot(user_id);
        let mut record = slot.lock().await;
        let applied = match record.as_mut() {
            Some(state) => {
                apply(state);
                state.touch();
                self.push(user_id, Some(&*state));
                true
            },
            None => false,
        };
        drop(record);
        drop(slot);

        if !applied {
            self.store.prune(user_id);
        }
        applied
    }

    /// Delete the user's record and registry entry and tell viewers.
    ///
    /// With `expected_epoch` set, nothing happens if another event for the
    /// user arrived since the epoch was taken.
    async fn end_session(&self, user_id: &str, reason: &str, expected_epoch: Option<u64>) {
        let slot = self.store.slot(user_id);
        let mut record = slot.lock().await;

        if let Some(expected) = expected_epoch {
            let current = self.epochs.get(user_id).map(|epoch| *epoch);
            if current != Some(expected) {
                debug!(user_id, "reconnect grace superseded by newer event");
                return;
            }
        }

        let had_session = self.registry.remove(user_id).is_some();
        let had_record = record.take().is_some();
        self.epochs.remove(user_id);
        self.push(user_id, None);
        drop(record);
        drop(slot);
        self.store.prune(user_id);

        if had_session || had_record {
            info!(user_id, reason, "session ended");
        }
    }

    fn arm_reconnect_grace(&self, user_id: &str, grace: Duration, epoch: u64) {
        let controller = self.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            controller
                .end_session(&user_id, "reconnect grace expired", Some(epoch))
                .await;
        });
    }

    /// Stamp the event for grace tracking; users without a session get none
    fn bump_epoch(&self, user_id: &str, event: &PlatformEvent) -> Option<u64> {
        self.reconnect_grace?;
        let starting = matches!(event, PlatformEvent::SessionStarted(_));
        if !starting && !self.registry.contains(user_id) {
            return None;
        }
        let stamp = self.next_epoch.fetch_add(1, Ordering::Relaxed) + 1;
        self.epochs.insert(user_id.to_string(), stamp);
        Some(stamp)
    }

    /// Start an unmanaged stream to `rtmp_url`, or the configured URL.
    ///
    /// A camera failure is returned to the caller and leaves the record as it was.
    pub async fn start_stream(&self, user_id: &str, rtmp_url: Option<&str>) -> Result<String, AppError> {
        let url = rtmp_url.unwrap_or(&*self.rtmp_url).to_string();

        let slot = self.store.slot(user_id);
        let mut record = slot.lock().await;
        let Some((session, state)) = self.live_session(user_id, &mut record) else {
            drop(record);
            drop(slot);
            self.store.prune(user_id);
            return Err(AppError::NoActiveSession(user_id.to_string()));
        };

        if let Err(e) = session.start_stream(&url).await {
            warn!(user_id, error = %e, "stream start failed");
            counter!(CAMERA_FAILURES).increment(1);
            return Err(e.into());
        }

        state.stream_type = StreamType::Unmanaged;
        state.status = STATUS_STARTING.to_string();
        state.rtmp_url = Some(url.clone());
        state.stream_id = None;
        state.error_detail = None;
        state.touch();
        self.push(user_id, Some(&*state));
        info!(user_id, rtmp_url = %url, "stream start requested");
        Ok(url)
    }

    /// Stop the running unmanaged stream, if any
    pub async fn stop_stream(&self, user_id: &str) -> Result<StopOutcome, AppError> {
        let slot = self.store.slot(user_id);
        let mut record = slot.lock().await;
        let Some((session, state)) = self.live_session(user_id, &mut record) else {
            drop(record);
            drop(slot);
            self.store.prune(user_id);
            return Err(AppError::NoActiveSession(user_id.to_string()));
        };
        if state.stream_type != StreamType::Unmanaged {
            return Ok(StopOutcome::NothingToStop);
        }

        if let Err(e) = session.stop_stream().await {
            warn!(user_id, error = %e, "stream stop failed");
            counter!(CAMERA_FAILURES).increment(1);
            return Err(e.into());
        }

        state.stream_type = StreamType::None;
        state.status = STATUS_IDLE.to_string();
        state.rtmp_url = None;
        state.stream_id = None;
        state.error_detail = None;
        state.touch();
        self.push(user_id, Some(&*state));
        info!(user_id, "stream stopped");
        Ok(StopOutcome::Stopped)
    }

    /// Handle and record of a session that is still live, read under the slot lock
    fn live_session<'a>(
        &self,
        user_id: &str,
        record: &'a mut Option<StreamState>,
    ) -> Option<(SessionHandle, &'a mut StreamState)> {
        let session = self.registry.get(user_id)?;
        record.as_mut().map(|state| (session, state))
    }

    /// Register a viewer; its first payload is the status at subscribe time
    pub async fn subscribe(&self, user_id: &str) -> StatusStream {
        let slot = self.store.slot(user_id);
        let record = slot.lock().await;
        let subscription = self.hub.subscribe(user_id, format_status(record.as_ref()));
        drop(record);

        StatusStream {
            subscription,
            store: self.store.clone(),
        }
    }

    /// Current status without subscribing
    pub async fn status(&self, user_id: &str) -> StatusPayload {
        format_status(self.store.snapshot(user_id).await.as_ref())
    }

    /// Close every viewer and forget every session in one sweep
    pub fn shutdown(&self) {
        let viewers = self.hub.close_all();
        let sessions = self.registry.len();
        self.registry.clear();
        self.store.clear();
        self.epochs.clear();
        info!(viewers, sessions, "controller shut down");
    }

    fn push(&self, user_id: &str, record: Option<&StreamState>) {
        let delivered = self.hub.push(user_id, &format_status(record));
        debug!(user_id, delivered, "status pushed");
    }
}

/// Status stream handed to one viewer
pub struct StatusStream {
    subscription: Subscription,
    store: StateStore,
}

impl StatusStream {
    pub async fn recv(&mut self) -> Option<StatusPayload> {
        self.subscription.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StatusPayload> {
        self.subscription.try_recv()
    }
}

impl Stream for StatusStream {
    type Item = StatusPayload;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.subscription).poll_next(cx)
    }
}

impl Drop for StatusStream {
    fn drop(&mut self) {
        // Viewers of users that never had a session must not pin a slot
        self.store.prune(&self.subscription.key().user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CameraError;
    use async_trait::async_trait;
    use crate::platform::PlatformSession;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSession {
        starts: AtomicUsize,
        stops: AtomicUsize,
        fail_start: bool,
    }

    #[async_trait]
    impl PlatformSession for CountingSession {
        fn session_id(&self) -> &str {
            "counting"
        }

        async fn start_stream(&self, _rtmp_url: &str) -> Result<(), CameraError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                Err(CameraError::Rejected("camera busy".to_string()))
            } else {
                Ok(())
            }
        }

        async fn stop_stream(&self) -> Result<(), CameraError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn show_text(&self, _text: &str) -> Result<(), CameraError> {
            Ok(())
        }
    }

    const URL: &str = "rtmp://example/live/key";

    fn controller() -> SessionController {
        SessionController::new(URL, BroadcastHub::new(16), None)
    }

    fn drain(stream: &mut StatusStream) -> Vec<StatusPayload> {
        std::iter::from_fn(|| stream.try_recv()).collect()
    }

    #[tokio::test]
    async fn test_session_start_pushes_starting() {
        let controller = controller();
        let mut viewer = controller.subscribe("user-1").await;
        assert!(!drain(&mut viewer)[0].has_session);

        let session = Arc::new(CountingSession::default());
        controller
            .dispatch("user-1", PlatformEvent::SessionStarted(session.clone()))
            .await;

        let pushed = drain(&mut viewer);
        let last = pushed.last().unwrap();
        assert!(last.has_session);
        assert_eq!(last.stream_type, Some(StreamType::Unmanaged));
        assert_eq!(last.status.as_deref(), Some(STATUS_STARTING));
        assert_eq!(last.rtmp_url.as_deref(), Some(URL));
        assert_eq!(session.starts.load(Ordering::SeqCst), 1);
        assert!(controller.registry().contains("user-1"));
    }

    #[tokio::test]
    async fn test_failed_default_start_is_recorded() {
        let controller = controller();
        let session = Arc::new(CountingSession { fail_start: true, ..Default::default() });
        controller
            .dispatch("user-1", PlatformEvent::SessionStarted(session))
            .await;

        let status = controller.status("user-1").await;
        assert!(status.has_session);
        assert_eq!(status.status.as_deref(), Some(STATUS_ERROR));
        assert_eq!(status.stream_type, Some(StreamType::None));
        assert!(status.error_detail.unwrap().contains("camera busy"));
    }

    #[tokio::test]
    async fn test_events_without_session_are_ignored() {
        let controller = controller();
        controller
            .dispatch(
                "ghost",
                PlatformEvent::StatusChanged(StreamStatusUpdate {
                    status: "active".to_string(),
                    stream_id: None,
                    error_details: None,
                    timestamp: None,
                }),
            )
            .await;
        controller
            .dispatch("ghost", PlatformEvent::BatteryUpdated(Some(serde_json::json!(50))))
            .await;

        assert!(!controller.status("ghost").await.has_session);
        assert!(controller.store().is_empty());
    }

    #[tokio::test]
    async fn test_stop_without_unmanaged_stream_is_noop() {
        let controller = controller();
        let session = Arc::new(CountingSession { fail_start: true, ..Default::default() });
        controller
            .dispatch("user-1", PlatformEvent::SessionStarted(session.clone()))
            .await;
        let before = controller.store().snapshot("user-1").await.unwrap();

        let outcome = controller.stop_stream("user-1").await.unwrap();
        assert_eq!(outcome, StopOutcome::NothingToStop);
        assert_eq!(session.stops.load(Ordering::SeqCst), 0);
        assert_eq!(controller.store().snapshot("user-1").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_commands_require_session() {
        let controller = controller();
        assert!(matches!(
            controller.start_stream("nobody", None).await,
            Err(AppError::NoActiveSession(_))
        ));
        assert!(matches!(
            controller.stop_stream("nobody").await,
            Err(AppError::NoActiveSession(_))
        ));
    }

    #[tokio::test]
    async fn test_viewer_drop_prunes_empty_slot() {
        let controller = controller();
        let viewer = controller.subscribe("lurker").await;
        assert_eq!(controller.store().len(), 1);
        drop(viewer);
        assert!(controller.store().is_empty());
        assert_eq!(controller.hub().total_subscribers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_grace_promotes_transient_disconnect() {
        let controller = SessionController::new(URL, BroadcastHub::new(16), Some(Duration::from_secs(5)));
        controller
            .dispatch("user-1", PlatformEvent::SessionStarted(Arc::new(CountingSession::default())))
            .await;
        controller
            .dispatch("user-1", PlatformEvent::Disconnected { permanent: false })
            .await;
        assert!(controller.registry().contains("user-1"));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!controller.registry().contains("user-1"));
        assert!(!controller.status("user-1").await.has_session);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_grace_cancelled_by_new_event() {
        let controller = SessionController::new(URL, BroadcastHub::new(16), Some(Duration::from_secs(5)));
        controller
            .dispatch("user-1", PlatformEvent::SessionStarted(Arc::new(CountingSession::default())))
            .await;
        controller
            .dispatch("user-1", PlatformEvent::Disconnected { permanent: false })
            .await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        controller
            .dispatch("user-1", PlatformEvent::BatteryUpdated(Some(serde_json::json!(70))))
            .await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(controller.registry().contains("user-1"));
        assert_eq!(controller.status("user-1").await.battery_percent, Some(70));
    }

    /// Session whose camera start can be held open once armed
    struct GatedSession {
        armed: std::sync::atomic::AtomicBool,
        entered: tokio::sync::Notify,
        gate: tokio::sync::Semaphore,
    }

    impl GatedSession {
        fn new() -> Self {
            Self {
                armed: Default::default(),
                entered: tokio::sync::Notify::new(),
                gate: tokio::sync::Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl PlatformSession for GatedSession {
        fn session_id(&self) -> &str {
            "gated"
        }

        async fn start_stream(&self, _rtmp_url: &str) -> Result<(), CameraError> {
            if self.armed.load(Ordering::SeqCst) {
                self.entered.notify_one();
                if let Ok(permit) = self.gate.acquire().await {
                    permit.forget();
                }
            }
            Ok(())
        }

        async fn stop_stream(&self) -> Result<(), CameraError> {
            Ok(())
        }

        async fn show_text(&self, _text: &str) -> Result<(), CameraError> {
            Ok(())
        }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_start_queued_behind_disconnect_does_not_revive_session() {
        let controller = controller();
        let session = Arc::new(GatedSession::new());
        controller
            .dispatch("user-1", PlatformEvent::SessionStarted(session.clone()))
            .await;
        session.armed.store(true, Ordering::SeqCst);

        // First start holds the slot while the camera call hangs
        let first = tokio::spawn({
            let controller = controller.clone();
            async move { controller.start_stream("user-1", None).await }
        });
        session.entered.notified().await;

        let disconnect = tokio::spawn({
            let controller = controller.clone();
            async move {
                controller
                    .dispatch("user-1", PlatformEvent::Disconnected { permanent: true })
                    .await
            }
        });
        settle().await;
        let second = tokio::spawn({
            let controller = controller.clone();
            async move { controller.start_stream("user-1", None).await }
        });
        settle().await;

        session.gate.add_permits(2);
        assert!(first.await.unwrap().is_ok());
        disconnect.await.unwrap();
        assert!(matches!(second.await.unwrap(), Err(AppError::NoActiveSession(_))));

        assert!(!controller.registry().contains("user-1"));
        assert!(!controller.status("user-1").await.has_session);
        assert!(controller.store().is_empty());
    }

    #[tokio::test]
    async fn test_stop_after_session_end_reports_no_session() {
        let controller = controller();
        controller
            .dispatch("user-1", PlatformEvent::SessionStarted(Arc::new(CountingSession::default())))
            .await;
        controller.dispatch("user-1", PlatformEvent::StopRequested).await;

        assert!(matches!(
            controller.stop_stream("user-1").await,
            Err(AppError::NoActiveSession(_))
        ));
        assert!(controller.store().is_empty());
    }

    #[tokio::test]
    async fn test_epochs_only_tracked_for_live_sessions() {
        let controller = SessionController::new(URL, BroadcastHub::new(16), Some(Duration::from_secs(5)));
        controller
            .dispatch("ghost", PlatformEvent::BatteryUpdated(Some(serde_json::json!(50))))
            .await;
        controller
            .dispatch("ghost", PlatformEvent::Disconnected { permanent: false })
            .await;
        assert!(controller.epochs.is_empty());

        controller
            .dispatch("user-1", PlatformEvent::SessionStarted(Arc::new(CountingSession::default())))
            .await;
        controller
            .dispatch("user-1", PlatformEvent::BatteryUpdated(Some(serde_json::json!(40))))
            .await;
        assert_eq!(controller.epochs.len(), 1);

        controller
            .dispatch("user-1", PlatformEvent::Disconnected { permanent: true })
            .await;
        assert!(controller.epochs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_grace_timer_spares_next_session() {
        let controller = SessionController::new(URL, BroadcastHub::new(16), Some(Duration::from_secs(5)));
        controller
            .dispatch("user-1", PlatformEvent::SessionStarted(Arc::new(CountingSession::default())))
            .await;
        controller
            .dispatch("user-1", PlatformEvent::Disconnected { permanent: false })
            .await;
        controller
            .dispatch("user-1", PlatformEvent::Disconnected { permanent: true })
            .await;

        // New session whose first events land before the old timer fires
        controller
            .dispatch("user-1", PlatformEvent::SessionStarted(Arc::new(CountingSession::default())))
            .await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(controller.registry().contains("user-1"));
        assert!(controller.status("user-1").await.has_session);
    }

    #[tokio::test]
    async fn test_shutdown_closes_viewers_and_sessions() {
        let controller = controller();
        controller
            .dispatch("user-1", PlatformEvent::SessionStarted(Arc::new(CountingSession::default())))
            .await;
        let mut viewer = controller.subscribe("user-1").await;

        controller.shutdown();
        assert!(controller.registry().is_empty());
        assert!(viewer.recv().await.is_some());
        assert!(viewer.recv().await.is_none());
    }
}
