//! `lock/tracking` requests.

use sc_01_lock_control::{LockControlApi, LockTracker, TrackingSink};
use shared_bus::{CabinetEvent, EventFilter, EventTopic, InMemoryEventBus, Subscription};
use std::sync::Arc;
use tracing::{debug, info};

use super::record_received;

/// Starts a close watch for each tracking request.
pub struct TrackingRequestHandler<A: LockControlApi + 'static, S: TrackingSink + 'static> {
    tracker: Arc<LockTracker<A, S>>,
    requests: Subscription,
}

impl<A, S> TrackingRequestHandler<A, S>
where
    A: LockControlApi + 'static,
    S: TrackingSink + 'static,
{
    pub fn new(bus: &InMemoryEventBus, tracker: Arc<LockTracker<A, S>>) -> Self {
        Self {
            tracker,
            requests: bus.subscribe(EventFilter::topics(vec![EventTopic::LockTracking])),
        }
    }

    pub async fn run(mut self) {
        info!("Lock tracking handler started");

        while let Some(event) = self.requests.recv().await {
            record_received(&event);
            if let CabinetEvent::LockTrackingRequested(request) = event {
                debug!(key = %request.key, "Tracking lock until closed");
                self.tracker.track(request);
            }
        }
    }
}
