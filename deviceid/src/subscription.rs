//! Broadcast event subscriptions.
//!
//! The SDK's event channel is modelled as a stream owned by the subscriber.
//! An [`EventSubscription`] is a scoped resource: dropping it releases the
//! registration, so the resolver holds one only while its event wait is live.

use crate::types::{BroadcastEvent, BroadcastEventKind};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{trace, warn};

type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

/// Source of SDK broadcast events.
pub trait EventSource: Send + Sync {
    /// Registers interest in events of `kind`.
    ///
    /// The registration lives as long as the returned subscription. Sources
    /// may deliver other kinds too; subscribers filter by kind.
    fn subscribe(&self, kind: BroadcastEventKind) -> EventSubscription;
}

impl<S: EventSource + ?Sized> EventSource for std::sync::Arc<S> {
    fn subscribe(&self, kind: BroadcastEventKind) -> EventSubscription {
        (**self).subscribe(kind)
    }
}

/// A live registration on an [`EventSource`].
pub struct EventSubscription {
    kind: BroadcastEventKind,
    events: BoxStream<'static, BroadcastEvent>,
    on_release: Option<ReleaseHook>,
}

impl EventSubscription {
    /// Wraps an event stream.
    pub fn new<S>(kind: BroadcastEventKind, events: S) -> Self
    where
        S: Stream<Item = BroadcastEvent> + Send + 'static,
    {
        Self {
            kind,
            events: events.boxed(),
            on_release: None,
        }
    }

    /// Wraps a broadcast receiver.
    ///
    /// A lagging receiver skips the events it missed and keeps going; the
    /// stream ends when every sender is gone.
    pub fn from_broadcast(
        kind: BroadcastEventKind,
        receiver: broadcast::Receiver<BroadcastEvent>,
    ) -> Self {
        let events = futures::stream::unfold(receiver, move |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((event, receiver)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%kind, skipped, "event subscription lagged, skipping missed events");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });
        Self::new(kind, events)
    }

    /// Runs `hook` when the subscription is dropped.
    #[must_use]
    pub fn on_release<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.on_release = Some(Box::new(hook));
        self
    }

    /// The kind this subscription was registered for.
    pub const fn kind(&self) -> BroadcastEventKind {
        self.kind
    }
}

impl Stream for EventSubscription {
    type Item = BroadcastEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        trace!(kind = %self.kind, "event subscription released");
        if let Some(release) = self.on_release.take() {
            release();
        }
    }
}

impl fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("kind", &self.kind)
            .field("has_release_hook", &self.on_release.is_some())
            .finish_non_exhaustive()
    }
}
