//! Device-ID resolution.
//!
//! Two strategies race for the identifier:
//!
//! - **direct query**: ask the SDK once; an empty answer is a failure.
//! - **event wait**: wait for the first `ReceivedDeviceId` broadcast carrying a
//!   usable identifier, bounded by a deadline measured from subscribing.
//!
//! The first *success* wins. A strategy that fails while the other is still
//! pending is ignored; resolution only fails when both have failed. The
//! outcome is published to the resolver's [`ResolutionSlot`] and the event
//! subscription is dropped as soon as the race settles.

use crate::accessor::DeviceIdAccessor;
use crate::config::ResolverConfig;
use crate::errors::{ResolutionError, ResolutionResult, StrategyError};
use crate::notify::{Notification, Notifier};
use crate::state::{AttemptId, Claim, ResolutionHandle, ResolutionSlot, SettledOutcome};
use crate::subscription::{EventSource, EventSubscription};
use crate::types::{BroadcastEventKind, DeviceId};
use async_trait::async_trait;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, Instrument};

/// One-shot device-ID query offered by the SDK.
#[async_trait]
pub trait DirectQuery: Send + Sync {
    /// Asks the SDK for the device ID.
    ///
    /// Returns an empty string when the SDK could not provide one. The
    /// returned future may never complete.
    async fn query_device_id(&self) -> String;
}

#[async_trait]
impl<Q: DirectQuery + ?Sized> DirectQuery for Arc<Q> {
    async fn query_device_id(&self) -> String {
        (**self).query_device_id().await
    }
}

/// Callback that completes a direct query.
pub type DeviceIdCallback = Box<dyn FnOnce(String) + Send>;

/// Adapts a callback-style SDK call into a [`DirectQuery`].
///
/// The wrapped function receives a callback and must invoke it at most once
/// with the device ID. Dropping the callback without invoking it counts as
/// an empty answer.
pub struct CallbackDirectQuery<F> {
    call: F,
}

impl<F> CallbackDirectQuery<F>
where
    F: Fn(DeviceIdCallback) + Send + Sync,
{
    /// Wraps `call`.
    pub const fn new(call: F) -> Self {
        Self { call }
    }
}

#[async_trait]
impl<F> DirectQuery for CallbackDirectQuery<F>
where
    F: Fn(DeviceIdCallback) + Send + Sync,
{
    async fn query_device_id(&self) -> String {
        let (tx, rx) = oneshot::channel();
        (self.call)(Box::new(move |device_id| {
            let _ = tx.send(device_id);
        }));
        rx.await.unwrap_or_default()
    }
}

impl<F> fmt::Debug for CallbackDirectQuery<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackDirectQuery").finish_non_exhaustive()
    }
}

/// Resolves the device ID once per attempt and memoizes the outcome.
pub struct DeviceIdResolver<Q, E, N> {
    direct: Arc<Q>,
    events: Arc<E>,
    notifier: Arc<N>,
    config: ResolverConfig,
    slot: ResolutionSlot,
}

impl<Q, E, N> DeviceIdResolver<Q, E, N>
where
    Q: DirectQuery + 'static,
    E: EventSource + 'static,
    N: Notifier + 'static,
{
    /// Creates a resolver with default configuration and its own slot.
    pub fn new(direct: Q, events: E, notifier: N) -> Self {
        Self::with_config(direct, events, notifier, ResolverConfig::default())
    }

    /// Creates a resolver with the given configuration and its own slot.
    pub fn with_config(direct: Q, events: E, notifier: N, config: ResolverConfig) -> Self {
        Self {
            direct: Arc::new(direct),
            events: Arc::new(events),
            notifier: Arc::new(notifier),
            config,
            slot: ResolutionSlot::new(),
        }
    }

    /// Uses `slot` to hold attempts instead of a private one.
    #[must_use]
    pub fn with_slot(mut self, slot: ResolutionSlot) -> Self {
        self.slot = slot;
        self
    }

    /// The slot attempts are published to.
    pub const fn slot(&self) -> &ResolutionSlot {
        &self.slot
    }

    /// The active configuration.
    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// An accessor reading this resolver's slot.
    pub fn accessor(&self) -> DeviceIdAccessor {
        DeviceIdAccessor::new(self.slot.clone())
    }

    /// Starts resolving the device ID, or joins the attempt already held.
    ///
    /// Whether a held attempt is reused follows
    /// [`ReinitializePolicy`](crate::ReinitializePolicy); a succeeded attempt
    /// is always reused. The event subscription is registered before this
    /// returns and the race runs on a spawned task, so it completes even if
    /// nobody awaits the handle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn initialize(&self) -> ResolutionHandle {
        match self.slot.claim(self.config.reinitialize) {
            Claim::Joined(handle) => {
                debug!(
                    attempt = %handle.attempt(),
                    status = ?handle.status(),
                    "device ID resolution already started, reusing attempt"
                );
                handle
            }
            Claim::Started(handle, publisher) => {
                self.start_attempt(handle.attempt(), publisher);
                handle
            }
        }
    }

    fn start_attempt(&self, attempt: AttemptId, publisher: watch::Sender<SettledOutcome>) {
        let race = Race {
            direct: Arc::clone(&self.direct),
            notifier: Arc::clone(&self.notifier),
            deadline: Instant::now() + self.config.subscription_timeout.as_duration(),
            timeout: self.config.subscription_timeout.as_duration(),
            notify_strategy_events: self.config.notify_strategy_events,
        };
        let subscription = self.events.subscribe(BroadcastEventKind::ReceivedDeviceId);
        let notifier = Arc::clone(&self.notifier);

        let span = info_span!("initialize_device_resolution", attempt = %attempt);
        tokio::spawn(
            async move {
                let started = Instant::now();
                let outcome = race.run(subscription).await;
                if let Err(err) = &outcome {
                    error!(error = %err, "device ID resolution failed");
                    notifier.notify(Notification::error(format!(
                        "Something went wrong during initialization of device ID: {err}"
                    )));
                } else {
                    info!(elapsed = ?started.elapsed(), "device ID resolution settled");
                }
                publisher.send_replace(Some(outcome));
            }
            .instrument(span),
        );
    }
}

impl<Q, E, N> fmt::Debug for DeviceIdResolver<Q, E, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdResolver")
            .field("config", &self.config)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

/// Everything one attempt needs once it leaves the resolver.
struct Race<Q, N> {
    direct: Arc<Q>,
    notifier: Arc<N>,
    deadline: Instant,
    timeout: Duration,
    notify_strategy_events: bool,
}

impl<Q, N> Race<Q, N>
where
    Q: DirectQuery,
    N: Notifier,
{
    async fn run(self, subscription: EventSubscription) -> ResolutionResult<DeviceId> {
        let direct_query = self.query_directly();
        let event_wait = self.wait_for_event(subscription);
        tokio::pin!(direct_query, event_wait);

        let mut direct_failure = None;
        let mut event_failure = None;

        loop {
            tokio::select! {
                // Ties go to the direct query, it was started first.
                biased;

                result = &mut direct_query, if direct_failure.is_none() => match result {
                    Ok(device_id) => {
                        info!(%device_id, strategy = "direct_query", "device ID resolved");
                        return Ok(device_id);
                    }
                    Err(err) => {
                        debug!(error = %err, "direct query failed, still waiting for event");
                        direct_failure = Some(err);
                    }
                },
                result = &mut event_wait, if event_failure.is_none() => match result {
                    Ok(device_id) => {
                        info!(%device_id, strategy = "event_wait", "device ID resolved");
                        return Ok(device_id);
                    }
                    Err(err) => {
                        debug!(error = %err, "event wait failed, still waiting for direct query");
                        event_failure = Some(err);
                    }
                },
            }

            if let (Some(direct), Some(event_wait)) = (&direct_failure, &event_failure) {
                return Err(ResolutionError::ResolutionFailed {
                    direct: direct.clone(),
                    event_wait: event_wait.clone(),
                });
            }
        }
    }

    async fn query_directly(&self) -> Result<DeviceId, StrategyError> {
        debug!("querying SDK for device ID");
        let raw = self.direct.query_device_id().await;
        DeviceId::try_new(raw).map_err(|_| {
            if self.notify_strategy_events {
                self.notifier.notify(Notification::info(
                    "Did not receive deviceID from getDeviceID",
                ));
            }
            StrategyError::EmptyDirectResult
        })
    }

    async fn wait_for_event(
        &self,
        mut subscription: EventSubscription,
    ) -> Result<DeviceId, StrategyError> {
        let first_device_id = async {
            while let Some(event) = subscription.next().await {
                if event.kind() != BroadcastEventKind::ReceivedDeviceId {
                    continue;
                }
                if self.notify_strategy_events {
                    self.notifier.notify(Notification::info(format!(
                        "DeviceID came from subscription {}",
                        raw_device_id(&event.data)
                    )));
                }
                if let Some(device_id) = event.device_id() {
                    return device_id;
                }
                debug!(data = %event.data, "ignoring device ID event without a usable ID");
            }
            // A closed stream cannot deliver anymore, the deadline still decides.
            std::future::pending().await
        };

        tokio::time::timeout_at(self.deadline, first_device_id)
            .await
            .map_err(|_| StrategyError::SubscriptionTimeout(self.timeout))
    }
}

/// `data.deviceId` as shown to the user, whether usable or not.
fn raw_device_id(data: &serde_json::Value) -> String {
    match data.get("deviceId") {
        Some(serde_json::Value::String(raw)) => raw.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Severity;
    use crate::types::BroadcastEvent;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::broadcast;
    use tracing_test::traced_test;

    #[derive(Clone)]
    struct FixedQuery {
        answer: Option<String>,
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    impl FixedQuery {
        fn answering(answer: &str, delay: Duration) -> Self {
            Self {
                answer: Some(answer.to_string()),
                delay,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn silent() -> Self {
            Self {
                answer: None,
                delay: Duration::ZERO,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl DirectQuery for FixedQuery {
        async fn query_device_id(&self) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match &self.answer {
                Some(answer) => answer.clone(),
                None => std::future::pending().await,
            }
        }
    }

    struct Channel(broadcast::Sender<BroadcastEvent>);

    impl EventSource for Channel {
        fn subscribe(&self, kind: BroadcastEventKind) -> EventSubscription {
            EventSubscription::from_broadcast(kind, self.0.subscribe())
        }
    }

    #[derive(Default)]
    struct Collected(Mutex<Vec<Notification>>);

    impl Notifier for Collected {
        fn notify(&self, notification: Notification) {
            self.0.lock().push(notification);
        }
    }

    fn channel() -> (broadcast::Sender<BroadcastEvent>, Channel) {
        let (tx, _) = broadcast::channel(16);
        (tx.clone(), Channel(tx))
    }

    #[tokio::test(start_paused = true)]
    async fn direct_query_wins_when_it_answers_first() {
        let (_tx, events) = channel();
        let resolver = DeviceIdResolver::new(
            FixedQuery::answering("xyz789", Duration::from_millis(100)),
            events,
            Collected::default(),
        );

        let outcome = resolver.initialize().outcome().await;
        assert_eq!(outcome.unwrap().into_inner(), "xyz789");
    }

    #[tokio::test(start_paused = true)]
    async fn event_wins_when_direct_query_never_answers() {
        let (tx, events) = channel();
        let resolver = DeviceIdResolver::new(FixedQuery::silent(), events, Collected::default());
        let handle = resolver.initialize();

        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(BroadcastEvent::received_device_id("abc123")).unwrap();

        assert_eq!(handle.outcome().await.unwrap().into_inner(), "abc123");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_direct_answer_waits_for_event() {
        let (tx, events) = channel();
        let resolver = DeviceIdResolver::new(
            FixedQuery::answering("", Duration::ZERO),
            events,
            Collected::default(),
        );
        let handle = resolver.initialize();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(handle.peek().is_none());

        tx.send(BroadcastEvent::received_device_id("abc123")).unwrap();
        assert_eq!(handle.outcome().await.unwrap().into_inner(), "abc123");
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn both_strategies_failing_notifies_and_settles_failure() {
        let (_tx, events) = channel();
        let notifier = Arc::new(Collected::default());
        let resolver = DeviceIdResolver::new(
            FixedQuery::answering("", Duration::ZERO),
            events,
            Arc::clone(&notifier),
        );

        let outcome = resolver.initialize().outcome().await;

        assert_eq!(
            outcome,
            Err(ResolutionError::ResolutionFailed {
                direct: StrategyError::EmptyDirectResult,
                event_wait: StrategyError::SubscriptionTimeout(Duration::from_secs(65)),
            })
        );
        let notifications = notifier.0.lock().clone();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].severity, Severity::Error);
        assert!(notifications[0]
            .message
            .starts_with("Something went wrong during initialization of device ID"));
        assert!(logs_contain("device ID resolution failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn event_wait_deadline_is_sixty_five_seconds() {
        let (tx, events) = channel();
        let resolver = DeviceIdResolver::new(
            FixedQuery::answering("", Duration::ZERO),
            events,
            Collected::default(),
        );
        let handle = resolver.initialize();

        tokio::time::sleep(Duration::from_millis(64_999)).await;
        assert!(handle.peek().is_none());

        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert!(matches!(
            handle.peek(),
            Some(Err(ResolutionError::ResolutionFailed { .. }))
        ));
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn unusable_events_are_skipped() {
        let (tx, events) = channel();
        let resolver = DeviceIdResolver::new(FixedQuery::silent(), events, Collected::default());
        let handle = resolver.initialize();
        tokio::task::yield_now().await;

        tx.send(BroadcastEvent::new(
            BroadcastEventKind::ReceivedGcmToken,
            serde_json::json!({ "deviceId": "not-this-one" }),
        ))
        .unwrap();
        tx.send(BroadcastEvent::received_device_id("")).unwrap();
        tx.send(BroadcastEvent::new(
            BroadcastEventKind::ReceivedDeviceId,
            serde_json::json!({ "deviceId": { "nested": true } }),
        ))
        .unwrap();
        tx.send(BroadcastEvent::received_device_id("abc123")).unwrap();

        assert_eq!(handle.outcome().await.unwrap().into_inner(), "abc123");
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_is_released_when_direct_query_wins() {
        let (tx, events) = channel();
        let resolver = DeviceIdResolver::new(
            FixedQuery::answering("xyz789", Duration::from_millis(100)),
            events,
            Collected::default(),
        );

        let handle = resolver.initialize();
        assert_eq!(tx.receiver_count(), 1);

        handle.outcome().await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(tx.receiver_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn strategy_notifications_are_opt_in() {
        let (tx, events) = channel();
        let notifier = Arc::new(Collected::default());
        let resolver = DeviceIdResolver::with_config(
            FixedQuery::answering("", Duration::ZERO),
            events,
            Arc::clone(&notifier),
            ResolverConfig::default().with_strategy_notifications(true),
        );
        assert!(resolver.config().notify_strategy_events);

        let handle = resolver.initialize();
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(BroadcastEvent::received_device_id("")).unwrap();
        tx.send(BroadcastEvent::received_device_id("abc123")).unwrap();
        handle.outcome().await.unwrap();

        let messages: Vec<_> = notifier
            .0
            .lock()
            .iter()
            .map(|n| n.message.clone())
            .collect();
        assert_eq!(
            messages,
            vec![
                "Did not receive deviceID from getDeviceID".to_string(),
                "DeviceID came from subscription ".to_string(),
                "DeviceID came from subscription abc123".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn strategy_notifications_stay_off_by_default() {
        let (tx, events) = channel();
        let notifier = Arc::new(Collected::default());
        let resolver = DeviceIdResolver::new(
            FixedQuery::answering("", Duration::ZERO),
            events,
            Arc::clone(&notifier),
        );
        assert_eq!(resolver.config(), &ResolverConfig::default());

        let handle = resolver.initialize();
        tokio::task::yield_now().await;
        tx.send(BroadcastEvent::received_device_id("abc123")).unwrap();
        handle.outcome().await.unwrap();

        assert!(notifier.0.lock().is_empty());
    }

    struct ClosedSource;

    impl EventSource for ClosedSource {
        fn subscribe(&self, kind: BroadcastEventKind) -> EventSubscription {
            EventSubscription::new(kind, futures::stream::empty())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn closed_event_stream_still_waits_for_deadline() {
        let resolver = DeviceIdResolver::new(
            FixedQuery::answering("", Duration::ZERO),
            ClosedSource,
            Collected::default(),
        );
        let started = Instant::now();
        let handle = resolver.initialize();

        tokio::time::sleep(Duration::from_secs(64)).await;
        assert!(handle.peek().is_none());

        assert_eq!(
            handle.outcome().await,
            Err(ResolutionError::ResolutionFailed {
                direct: StrategyError::EmptyDirectResult,
                event_wait: StrategyError::SubscriptionTimeout(Duration::from_secs(65)),
            })
        );
        assert!(started.elapsed() >= Duration::from_secs(65));
        assert!(started.elapsed() < Duration::from_secs(66));
    }

    struct ReadyQuery(&'static str);

    #[async_trait]
    impl DirectQuery for ReadyQuery {
        async fn query_device_id(&self) -> String {
            self.0.to_string()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn direct_query_wins_a_tie_with_queued_event() {
        let (tx, events) = channel();
        let resolver = DeviceIdResolver::new(ReadyQuery("direct"), events, Collected::default());

        let handle = resolver.initialize();
        // Queued before the race task is first polled, so both are ready at once
        tx.send(BroadcastEvent::received_device_id("event")).unwrap();

        assert_eq!(handle.outcome().await.unwrap().into_inner(), "direct");
    }

    struct SlotReadingSource {
        slot: ResolutionSlot,
        seen: Mutex<Vec<Option<AttemptId>>>,
        events: Channel,
    }

    impl EventSource for SlotReadingSource {
        fn subscribe(&self, kind: BroadcastEventKind) -> EventSubscription {
            self.seen
                .lock()
                .push(self.slot.current().map(|h| h.attempt()));
            self.events.subscribe(kind)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn event_source_may_read_the_slot_while_subscribing() {
        let (tx, events) = channel();
        let slot = ResolutionSlot::new();
        let source = Arc::new(SlotReadingSource {
            slot: slot.clone(),
            seen: Mutex::new(Vec::new()),
            events,
        });
        let resolver =
            DeviceIdResolver::new(FixedQuery::silent(), Arc::clone(&source), Collected::default())
                .with_slot(slot);

        let handle = resolver.initialize();

        assert_eq!(*source.seen.lock(), vec![Some(handle.attempt())]);
        tokio::task::yield_now().await;
        tx.send(BroadcastEvent::received_device_id("abc123")).unwrap();
        assert_eq!(handle.outcome().await.unwrap().into_inner(), "abc123");
    }

    #[tokio::test(start_paused = true)]
    async fn join_in_flight_does_not_query_twice() {
        let (_tx, events) = channel();
        let query = FixedQuery::answering("xyz789", Duration::from_secs(1));
        let calls = Arc::clone(&query.calls);
        let resolver = DeviceIdResolver::new(query, events, Collected::default());

        let first = resolver.initialize();
        let second = resolver.initialize();
        assert_eq!(first.attempt(), second.attempt());

        assert_eq!(second.outcome().await.unwrap().into_inner(), "xyz789");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn callback_query_forwards_callback_value() {
        let query = CallbackDirectQuery::new(|callback: DeviceIdCallback| {
            callback("abc123".to_string());
        });
        assert_eq!(query.query_device_id().await, "abc123");
    }

    #[tokio::test]
    async fn dropped_callback_counts_as_empty_answer() {
        let query = CallbackDirectQuery::new(|callback: DeviceIdCallback| drop(callback));
        assert_eq!(query.query_device_id().await, "");
    }
}
