//! In-memory collaborators for `deviceid`
//!
//! This crate provides a scriptable stand-in for the marketing-cloud SDK and
//! a notifier that records what it was asked to show. Useful for tests and
//! demos where the real SDK is not available.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deviceid::{
    BroadcastEvent, BroadcastEventKind, DirectQuery, EventSource, EventSubscription,
    Notification, Notifier, Severity,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

const EVENT_BUFFER: usize = 64;

/// How the in-memory SDK answers a direct device-ID query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectResponse {
    /// Call back with `device_id` after `after` has elapsed.
    Answer {
        /// Value handed to the callback, may be empty.
        device_id: String,
        /// Delay before calling back.
        after: Duration,
    },
    /// Never call back.
    Never,
}

impl DirectResponse {
    /// Answer with `device_id` straight away.
    pub fn immediate(device_id: impl Into<String>) -> Self {
        Self::Answer {
            device_id: device_id.into(),
            after: Duration::ZERO,
        }
    }

    /// Answer with `device_id` after `after`.
    pub fn delayed(device_id: impl Into<String>, after: Duration) -> Self {
        Self::Answer {
            device_id: device_id.into(),
            after,
        }
    }

    /// Answer with an empty identifier straight away.
    pub fn empty() -> Self {
        Self::immediate(String::new())
    }
}

#[derive(Debug)]
struct SdkState {
    direct: Mutex<DirectResponse>,
    channels: Mutex<HashMap<BroadcastEventKind, broadcast::Sender<BroadcastEvent>>>,
    direct_queries: AtomicUsize,
    subscriptions_opened: AtomicUsize,
}

/// Scriptable in-memory marketing-cloud SDK.
///
/// Implements both [`DirectQuery`] and [`EventSource`]. Clones share state,
/// so a test can keep one clone to emit events while the resolver owns
/// another.
#[derive(Debug, Clone)]
pub struct InMemorySdk {
    state: Arc<SdkState>,
}

impl InMemorySdk {
    /// Create an SDK whose direct query never answers
    pub fn new() -> Self {
        Self {
            state: Arc::new(SdkState {
                direct: Mutex::new(DirectResponse::Never),
                channels: Mutex::new(HashMap::new()),
                direct_queries: AtomicUsize::new(0),
                subscriptions_opened: AtomicUsize::new(0),
            }),
        }
    }

    /// Sets how subsequent direct queries answer.
    #[must_use]
    pub fn with_direct_response(self, response: DirectResponse) -> Self {
        self.set_direct_response(response);
        self
    }

    /// Changes how subsequent direct queries answer.
    pub fn set_direct_response(&self, response: DirectResponse) {
        *self.state.direct.lock() = response;
    }

    fn sender(&self, kind: BroadcastEventKind) -> broadcast::Sender<BroadcastEvent> {
        self.state
            .channels
            .lock()
            .entry(kind)
            .or_insert_with(|| broadcast::channel(EVENT_BUFFER).0)
            .clone()
    }

    /// Broadcasts `event` to subscribers of its kind.
    ///
    /// Returns how many subscriptions received it.
    pub fn emit(&self, event: BroadcastEvent) -> usize {
        let kind = event.kind();
        let delivered = self.sender(kind).send(event).unwrap_or(0);
        debug!(%kind, delivered, "in-memory SDK emitted event");
        delivered
    }

    /// Broadcasts a `ReceivedDeviceId` event carrying `device_id`.
    pub fn emit_device_id(&self, device_id: impl Into<String>) -> usize {
        self.emit(BroadcastEvent::received_device_id(device_id))
    }

    /// Broadcasts `event` after `delay` on a spawned task.
    pub fn emit_after(&self, delay: Duration, event: BroadcastEvent) -> JoinHandle<usize> {
        let sdk = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sdk.emit(event)
        })
    }

    /// Number of live subscriptions for `kind`.
    pub fn active_subscriptions(&self, kind: BroadcastEventKind) -> usize {
        self.state
            .channels
            .lock()
            .get(&kind)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Number of subscriptions ever opened, across all kinds.
    pub fn subscriptions_opened(&self) -> usize {
        self.state.subscriptions_opened.load(Ordering::SeqCst)
    }

    /// Number of direct queries made so far.
    pub fn direct_queries(&self) -> usize {
        self.state.direct_queries.load(Ordering::SeqCst)
    }
}

impl Default for InMemorySdk {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DirectQuery for InMemorySdk {
    async fn query_device_id(&self) -> String {
        self.state.direct_queries.fetch_add(1, Ordering::SeqCst);
        let response = self.state.direct.lock().clone();
        match response {
            DirectResponse::Answer { device_id, after } => {
                tokio::time::sleep(after).await;
                device_id
            }
            DirectResponse::Never => std::future::pending().await,
        }
    }
}

impl EventSource for InMemorySdk {
    fn subscribe(&self, kind: BroadcastEventKind) -> EventSubscription {
        self.state.subscriptions_opened.fetch_add(1, Ordering::SeqCst);
        let receiver = self.sender(kind).subscribe();
        EventSubscription::from_broadcast(kind, receiver)
    }
}

/// Notifier that keeps every notification for later inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications received so far, oldest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    /// Notifications with [`Severity::Error`].
    pub fn errors(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .iter()
            .filter(|n| n.severity == Severity::Error)
            .cloned()
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().push(notification);
    }
}
