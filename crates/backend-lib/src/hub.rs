// ============================
// glasscast-backend-lib/src/hub.rs
// ============================
//! Fan-out of status payloads to every open viewer of a user.
//!
//! Each viewer owns a bounded queue. Delivery never waits on a viewer. Once a
//! viewer's queue is full, further payloads collapse into a single "latest"
//! slot read after the queue drains, so a lagging viewer skips intermediate
//! states but always ends on the newest one. A closed queue removes the viewer.
use dashmap::DashMap;
use futures_util::Stream;
use glasscast_common::{StatusPayload, UserId};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics::{STATUS_DROPPED, STATUS_PUSHED, SUBSCRIBERS_ACTIVE};

/// Identifies one registered viewer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub user_id: UserId,
    pub id: Uuid,
}

/// Newest payload that did not fit in the queue.
///
/// Sender and receiver both hold this lock while touching the queue, so a
/// payload parked here is never overtaken by a later one sent to the queue.
type Latest = Arc<Mutex<Option<StatusPayload>>>;

struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<StatusPayload>,
    latest: Latest,
}

enum Delivery {
    Queued,
    /// Parked in the latest slot; `true` when it replaced an older parked payload
    Parked(bool),
    Closed,
}

impl Subscriber {
    fn deliver(&self, payload: &StatusPayload) -> Delivery {
        let mut latest = self.latest.lock();
        if self.tx.is_closed() {
            return Delivery::Closed;
        }
        if latest.is_some() {
            *latest = Some(payload.clone());
            return Delivery::Parked(true);
        }
        match self.tx.try_send(payload.clone()) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(payload)) => {
                *latest = Some(payload);
                Delivery::Parked(false)
            },
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

/// Viewers of every user
#[derive(Clone)]
pub struct BroadcastHub {
    topics: Arc<DashMap<UserId, Vec<Subscriber>>>,
    buffer: usize,
}

impl BroadcastHub {
    /// `buffer` is the number of payloads queued per viewer
    pub fn new(buffer: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Register a viewer whose first payload is `initial`
    pub fn subscribe(&self, user_id: &str, initial: StatusPayload) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        // A fresh queue always has room
        let _ = tx.try_send(initial);
        let latest = Latest::default();

        let id = Uuid::new_v4();
        self.topics
            .entry(user_id.to_string())
            .or_default()
            .push(Subscriber { id, tx, latest: Arc::clone(&latest) });
        gauge!(SUBSCRIBERS_ACTIVE).increment(1.0);
        debug!(user_id, subscription = %id, "viewer subscribed");

        Subscription {
            key: SubscriptionKey { user_id: user_id.to_string(), id },
            hub: self.clone(),
            rx,
            latest,
        }
    }

    /// Remove a viewer. Unknown or already removed keys are ignored.
    pub fn unsubscribe(&self, key: &SubscriptionKey) -> bool {
        let removed = match self.topics.get_mut(&key.user_id) {
            Some(mut subscribers) => {
                let before = subscribers.len();
                subscribers.retain(|s| s.id != key.id);
                before != subscribers.len()
            },
            None => false,
        };
        self.topics.remove_if(&key.user_id, |_, subscribers| subscribers.is_empty());

        if removed {
            gauge!(SUBSCRIBERS_ACTIVE).decrement(1.0);
            debug!(user_id = %key.user_id, subscription = %key.id, "viewer unsubscribed");
        }
        removed
    }

    /// Deliver `payload` to every viewer of `user_id`, returning how many will see it
    pub fn push(&self, user_id: &str, payload: &StatusPayload) -> usize {
        let mut delivered = 0;
        let mut closed = 0;

        if let Some(mut subscribers) = self.topics.get_mut(user_id) {
            subscribers.retain(|subscriber| match subscriber.deliver(payload) {
                Delivery::Queued => {
                    delivered += 1;
                    true
                },
                Delivery::Parked(replaced) => {
                    if replaced {
                        // The viewer never sees the payload this one superseded
                        counter!(STATUS_DROPPED).increment(1);
                    } else {
                        warn!(user_id, subscription = %subscriber.id, "viewer queue full, keeping latest status only");
                    }
                    delivered += 1;
                    true
                },
                Delivery::Closed => {
                    closed += 1;
                    false
                },
            });
        }

        if closed > 0 {
            self.topics.remove_if(user_id, |_, subscribers| subscribers.is_empty());
            gauge!(SUBSCRIBERS_ACTIVE).decrement(closed as f64);
            debug!(user_id, closed, "removed closed viewers");
        }
        counter!(STATUS_PUSHED).increment(delivered as u64);
        delivered
    }

    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.topics.get(user_id).map_or(0, |subscribers| subscribers.len())
    }

    pub fn total_subscribers(&self) -> usize {
        self.topics.iter().map(|entry| entry.value().len()).sum()
    }

    /// Close every viewer stream, returning how many were open
    pub fn close_all(&self) -> usize {
        let open = self.total_subscribers();
        self.topics.clear();
        gauge!(SUBSCRIBERS_ACTIVE).set(0.0);
        open
    }
}

/// One viewer's stream of payloads; dropping it unsubscribes
pub struct Subscription {
    key: SubscriptionKey,
    hub: BroadcastHub,
    rx: mpsc::Receiver<StatusPayload>,
    latest: Latest,
}

impl Subscription {
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Next payload, or `None` once the hub has closed this viewer
    pub async fn recv(&mut self) -> Option<StatusPayload> {
        poll_fn(|cx| self.poll_payload(cx)).await
    }

    /// Next payload if one is already queued
    pub fn try_recv(&mut self) -> Option<StatusPayload> {
        let mut latest = self.latest.lock();
        self.rx.try_recv().ok().or_else(|| latest.take())
    }

    fn poll_payload(&mut self, cx: &mut Context<'_>) -> Poll<Option<StatusPayload>> {
        let mut latest = self.latest.lock();
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(payload)) => Poll::Ready(Some(payload)),
            // Closed: hand out a parked payload before ending
            Poll::Ready(None) => Poll::Ready(latest.take()),
            Poll::Pending => match latest.take() {
                Some(payload) => Poll::Ready(Some(payload)),
                None => Poll::Pending,
            },
        }
    }
}

impl Stream for Subscription {
    type Item = StatusPayload;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.poll_payload(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(&self.key);
    }
}
