// ============================
// glasscast-backend-lib/src/state.rs
// ============================
//! Per-user stream state records and the status formatter.
//!
//! Each user gets one slot: an async mutex around an optional record. The
//! mutex is what serializes a user's events, commands and subscriptions, so
//! every mutate, format and push for that user happens while it is held.
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use glasscast_common::{StatusPayload, StreamType, UserId};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const STATUS_IDLE: &str = "idle";
pub const STATUS_STARTING: &str = "starting";
pub const STATUS_ERROR: &str = "error";

/// Last known camera/stream status of one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamState {
    pub stream_type: StreamType,
    /// Opaque token supplied by the platform
    pub status: String,
    pub rtmp_url: Option<String>,
    pub stream_id: Option<String>,
    pub hls_url: Option<String>,
    pub dash_url: Option<String>,
    pub error_detail: Option<String>,
    pub battery_percent: Option<u8>,
    pub updated_at: DateTime<Utc>,
}

impl StreamState {
    /// Fresh record for a session that just started
    pub fn new() -> Self {
        Self {
            stream_type: StreamType::None,
            status: STATUS_IDLE.to_string(),
            rtmp_url: None,
            stream_id: None,
            hls_url: None,
            dash_url: None,
            error_detail: None,
            battery_percent: None,
            updated_at: Utc::now(),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a record, or its absence, as the payload viewers receive
pub fn format_status(record: Option<&StreamState>) -> StatusPayload {
    let Some(record) = record else {
        return StatusPayload::no_session();
    };

    StatusPayload {
        has_session: true,
        stream_type: Some(record.stream_type),
        status: Some(record.status.clone()),
        rtmp_url: record.rtmp_url.clone(),
        stream_id: record.stream_id.clone(),
        hls_url: record.hls_url.clone(),
        dash_url: record.dash_url.clone(),
        error_detail: record.error_detail.clone(),
        battery_percent: record.battery_percent,
        updated_at: Some(record.updated_at),
    }
}

pub type StateSlot = Arc<Mutex<Option<StreamState>>>;

/// Stream state records of every user
#[derive(Clone, Default)]
pub struct StateStore {
    slots: Arc<DashMap<UserId, StateSlot>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The user's slot, created empty on first use
    pub fn slot(&self, user_id: &str) -> StateSlot {
        Arc::clone(self.slots.entry(user_id.to_string()).or_default().value())
    }

    /// Copy of the user's current record
    pub async fn snapshot(&self, user_id: &str) -> Option<StreamState> {
        let slot = self.slots.get(user_id).map(|entry| Arc::clone(entry.value()))?;
        let record = slot.lock().await;
        record.clone()
    }

    /// Forget an empty slot nobody is holding.
    ///
    /// A slot is only dropped while the map is its sole owner, so two tasks can
    /// never end up serializing on different mutexes for the same user.
    pub fn prune(&self, user_id: &str) -> bool {
        self.slots
            .remove_if(user_id, |_, slot| {
                Arc::strong_count(slot) == 1
                    && slot.try_lock().map(|record| record.is_none()).unwrap_or(false)
            })
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_absent_record() {
        let payload = format_status(None);
        assert!(!payload.has_session);
        assert_eq!(payload, StatusPayload::no_session());
    }

    #[test]
    fn test_format_copies_every_field() {
        let record = StreamState {
            stream_type: StreamType::Unmanaged,
            status: "active".to_string(),
            rtmp_url: Some("rtmp://example/live/key".to_string()),
            stream_id: Some("abc123".to_string()),
            hls_url: None,
            dash_url: None,
            error_detail: None,
            battery_percent: Some(80),
            ..StreamState::new()
        };

        let payload = format_status(Some(&record));
        assert!(payload.has_session);
        assert_eq!(payload.stream_type, Some(StreamType::Unmanaged));
        assert_eq!(payload.status.as_deref(), Some("active"));
        assert_eq!(payload.rtmp_url.as_deref(), Some("rtmp://example/live/key"));
        assert_eq!(payload.stream_id.as_deref(), Some("abc123"));
        assert_eq!(payload.battery_percent, Some(80));
        assert_eq!(payload.updated_at, Some(record.updated_at));

        // Same record, same payload
        assert_eq!(payload, format_status(Some(&record)));
    }

    #[tokio::test]
    async fn test_slot_is_shared_per_user() {
        let store = StateStore::new();
        {
            let slot = store.slot("user-1");
            *slot.lock().await = Some(StreamState::new());
        }
        assert!(store.snapshot("user-1").await.is_some());
        assert!(store.snapshot("user-2").await.is_none());
    }

    #[tokio::test]
    async fn test_prune_keeps_live_or_held_slots() {
        let store = StateStore::new();

        let held = store.slot("user-1");
        assert!(!store.prune("user-1"));
        drop(held);
        assert!(store.prune("user-1"));
        assert!(store.is_empty());

        *store.slot("user-2").lock().await = Some(StreamState::new());
        assert!(!store.prune("user-2"));
        assert_eq!(store.len(), 1);
    }
}
