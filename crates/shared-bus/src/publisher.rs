//! # Event Publisher
//!
//! Publishing side of the event bus.

use crate::events::{CabinetEvent, EventFilter};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, trace};

/// Interface subsystems use to emit events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event; returns the number of subscribers that received it.
    async fn publish(&self, event: CabinetEvent) -> usize;

    /// Total number of events published.
    fn events_published(&self) -> u64;
}

/// In-memory event bus over `tokio::sync::broadcast`.
///
/// Every subscriber sees every event; topic filtering happens on the
/// receiving side in [`Subscription`].
pub struct InMemoryEventBus {
    sender: broadcast::Sender<CabinetEvent>,

    /// Active subscription count by filter key.
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    events_published: AtomicU64,

    capacity: usize,
}

impl InMemoryEventBus {
    /// Create a new in-memory event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to events matching a filter.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let receiver = self.sender.subscribe();
        let key = format!("{:?}", filter.topics);

        *self.subscriptions.write().entry(key.clone()).or_insert(0) += 1;
        debug!(topics = ?filter.topics, "New subscription created");

        Subscription::new(receiver, filter, self.subscriptions.clone(), key)
    }

    /// Stream of events matching a filter. Lagged events are skipped.
    pub fn event_stream(&self, filter: EventFilter) -> impl Stream<Item = CabinetEvent> {
        BroadcastStream::new(self.sender.subscribe()).filter_map(move |item| match item {
            Ok(event) if filter.matches(&event) => Some(event),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(count)) => {
                debug!(lagged = count, "Event stream lagged, some events dropped");
                None
            }
        })
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Number of live `Subscription` handles per filter key.
    #[must_use]
    pub fn subscriptions_for(&self, filter: &EventFilter) -> usize {
        let key = format!("{:?}", filter.topics);
        self.subscriptions.read().get(&key).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: CabinetEvent) -> usize {
        let path = event.path();
        let source = event.source_subsystem();

        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(receivers) => {
                trace!(topic = %path, source, receivers, "Event published");
                receivers
            }
            Err(_) => {
                debug!(topic = %path, source, "Event dropped (no receivers)");
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use std::time::Duration;
    use uuid::Uuid;

    fn closed() -> CabinetEvent {
        CabinetEvent::BinClosed {
            bin_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_publish_no_subscribers() {
        let bus = InMemoryEventBus::new();

        let receivers = bus.publish(closed()).await;
        assert_eq!(receivers, 0);
        assert_eq!(bus.events_published(), 1);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = InMemoryEventBus::new();

        let _all = bus.subscribe(EventFilter::all());
        let _close = bus.subscribe(EventFilter::topics(vec![EventTopic::BinClose]));
        let _open = bus.subscribe(EventFilter::topics(vec![EventTopic::BinOpen]));

        // Broadcast reaches every receiver; filtering happens on recv.
        assert_eq!(bus.publish(closed()).await, 3);
        assert_eq!(bus.subscriber_count(), 3);
        assert_eq!(
            bus.subscriptions_for(&EventFilter::topics(vec![EventTopic::BinOpen])),
            1
        );
    }

    #[tokio::test]
    async fn test_event_stream_filters() {
        let bus = InMemoryEventBus::new();
        let stream = bus.event_stream(EventFilter::topics(vec![EventTopic::DeviceActive]));
        tokio::pin!(stream);

        bus.publish(closed()).await;
        let bin_id = Uuid::new_v4();
        bus.publish(CabinetEvent::DeviceActivated { bin_id }).await;

        let next = tokio::time::timeout(Duration::from_millis(100), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(next, CabinetEvent::DeviceActivated { bin_id: id } if id == bin_id));
    }

    #[test]
    fn test_default_bus() {
        let bus = InMemoryEventBus::default();
        assert_eq!(bus.capacity(), DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.events_published(), 0);
    }
}
