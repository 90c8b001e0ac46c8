// ============================
// glasscast-backend-lib/src/registry.rs
// ============================
//! Registry of live glasses sessions, keyed by user.
use dashmap::DashMap;
use glasscast_common::UserId;
use metrics::gauge;
use std::sync::Arc;

use crate::metrics::SESSIONS_ACTIVE;
use crate::platform::SessionHandle;

/// Single source of truth for "is this user currently connected"
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<UserId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the handle for a user, returning the one it replaced
    pub fn put(&self, user_id: &str, handle: SessionHandle) -> Option<SessionHandle> {
        let previous = self.sessions.insert(user_id.to_string(), handle);
        gauge!(SESSIONS_ACTIVE).set(self.sessions.len() as f64);
        previous
    }

    pub fn get(&self, user_id: &str) -> Option<SessionHandle> {
        self.sessions.get(user_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, user_id: &str) -> Option<SessionHandle> {
        let removed = self.sessions.remove(user_id).map(|(_, handle)| handle);
        if removed.is_some() {
            gauge!(SESSIONS_ACTIVE).set(self.sessions.len() as f64);
        }
        removed
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every handle at once
    pub fn clear(&self) {
        self.sessions.clear();
        gauge!(SESSIONS_ACTIVE).set(0.0);
    }
}
