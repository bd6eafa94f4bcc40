//! # Event Subscriber
//!
//! Receiving side of the event bus.

use crate::events::{CabinetEvent, EventFilter};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Event bus closed")]
    Closed,
}

/// A subscription handle. Dropping it unregisters the subscription.
pub struct Subscription {
    receiver: broadcast::Receiver<CabinetEvent>,
    filter: EventFilter,
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,
    key: String,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<CabinetEvent>,
        filter: EventFilter,
        subscriptions: Arc<RwLock<HashMap<String, usize>>>,
        key: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            subscriptions,
            key,
        }
    }

    /// Receive the next event that matches the filter.
    ///
    /// Returns `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<CabinetEvent> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(lagged = count, filter = ?self.filter.topics, "Subscriber lagged, events dropped");
                    continue;
                }
            };

            if self.filter.matches(&event) {
                return Some(event);
            }
        }
    }

    /// Non-blocking receive. `Ok(None)` means nothing matching is queued.
    pub fn try_recv(&mut self) -> Result<Option<CabinetEvent>, SubscriptionError> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(e) => e,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };

            if self.filter.matches(&event) {
                return Ok(Some(event));
            }
        }
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut subs = self.subscriptions.write();
        if let Some(count) = subs.get_mut(&self.key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                subs.remove(&self.key);
            }
        }
        debug!(filter = %self.key, "Subscription dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use crate::publisher::{EventPublisher, InMemoryEventBus};
    use shared_types::ipc::SensorWatch;
    use std::time::Duration;
    use tokio::time::timeout;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_subscription_filter_skips_other_topics() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::topics(vec![EventTopic::LoadcellStartReading]));

        bus.publish(CabinetEvent::BinClosed {
            bin_id: Uuid::new_v4(),
        })
        .await;
        let watch = SensorWatch {
            bin_id: Uuid::new_v4(),
            hardware_ids: vec![11, 12],
        };
        bus.publish(CabinetEvent::StartReading(watch.clone())).await;

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("event");

        match received {
            CabinetEvent::StartReading(got) => assert_eq!(got, watch),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscription_drop_cleanup() {
        let bus = InMemoryEventBus::new();
        let filter = EventFilter::all();

        {
            let _sub1 = bus.subscribe(filter.clone());
            let _sub2 = bus.subscribe(filter.clone());
            assert_eq!(bus.subscriptions_for(&filter), 2);
        }

        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.subscriptions_for(&filter), 0);
    }

    #[tokio::test]
    async fn test_try_recv() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        assert!(matches!(sub.try_recv(), Ok(None)));

        bus.publish(CabinetEvent::DeviceActivated {
            bin_id: Uuid::new_v4(),
        })
        .await;
        assert!(matches!(
            sub.try_recv(),
            Ok(Some(CabinetEvent::DeviceActivated { .. }))
        ));
    }

    #[tokio::test]
    async fn test_recv_returns_none_when_bus_dropped() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        drop(bus);
        assert!(sub.recv().await.is_none());
    }
}
