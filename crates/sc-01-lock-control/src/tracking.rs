//! Lock tracking - watch a lock until it is physically closed again.
//!
//! Re-securing a compartment is done by a person, not commanded, so it is
//! detected by polling GET_STATUS. A monitor reports every change in the
//! observed statuses and stops once all tracked locks read CLOSED. After the
//! ceiling elapses it reports `timed_out` and stops.

use cabinet_telemetry::LOCK_TRACKING_ACTIVE;
use shared_bus::{CancelToken, MonitorRegistry};
use shared_types::ipc::{LockTrackingRequest, LockTrackingStatus};
use shared_types::lock::{LockCommand, LockCommandRequest, LockState, LockStatusResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::ports::{LockControlApi, TrackingSink};

#[derive(Clone, Debug)]
pub struct TrackingConfig {
    pub poll_interval: Duration,
    /// Hard ceiling on how long a lock may stay open.
    pub ceiling: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            ceiling: Duration::from_secs(60 * 60),
        }
    }
}

/// Runs one close monitor per key.
pub struct LockTracker<A, S>
where
    A: LockControlApi + 'static,
    S: TrackingSink + 'static,
{
    config: TrackingConfig,
    api: Arc<A>,
    sink: Arc<S>,
    monitors: MonitorRegistry<String>,
}

impl<A, S> LockTracker<A, S>
where
    A: LockControlApi + 'static,
    S: TrackingSink + 'static,
{
    pub fn new(config: TrackingConfig, api: Arc<A>, sink: Arc<S>) -> Self {
        Self {
            config,
            api,
            sink,
            monitors: MonitorRegistry::new("lock-tracking"),
        }
    }

    /// Start (or restart) tracking for `request.key`.
    pub fn track(&self, request: LockTrackingRequest) {
        let api = self.api.clone();
        let sink = self.sink.clone();
        let config = self.config.clone();
        info!(key = %request.key, device_id = request.request.device_id, "Lock tracking started");

        self.monitors.start(request.key.clone(), move |cancel| {
            watch_until_closed(config, api, sink, request, cancel)
        });
    }

    pub fn stop(&self, key: &str) -> bool {
        self.monitors.stop(&key.to_string())
    }

    pub fn is_tracking(&self, key: &str) -> bool {
        self.monitors.is_active(&key.to_string())
    }

    pub async fn shutdown(&self) {
        self.monitors.shutdown().await;
    }
}

async fn watch_until_closed<A, S>(
    config: TrackingConfig,
    api: Arc<A>,
    sink: Arc<S>,
    tracking: LockTrackingRequest,
    mut cancel: CancelToken,
) where
    A: LockControlApi,
    S: TrackingSink,
{
    LOCK_TRACKING_ACTIVE.inc();

    let status_request = LockCommandRequest {
        command: LockCommand::GetStatus,
        ..tracking.request.clone()
    };
    let lock_ids = status_request.effective_lock_ids();
    let deadline = Instant::now() + config.ceiling;

    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<LockStatusResult> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(key = %tracking.key, "Lock tracking cancelled");
                break;
            }
            _ = tokio::time::sleep_until(deadline) => {
                warn!(key = %tracking.key, ceiling_secs = config.ceiling.as_secs(), "Lock not closed before ceiling");
                let result = last
                    .take()
                    .unwrap_or_else(|| LockStatusResult::failed(status_request.device_id, &lock_ids));
                sink.report(LockTrackingStatus {
                    key: tracking.key.clone(),
                    bin_id: tracking.bin_id,
                    result,
                    all_closed: false,
                    timed_out: true,
                })
                .await;
                break;
            }
            _ = ticker.tick() => {
                let result = match api.execute(status_request.clone()).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(key = %tracking.key, error = %e, "Lock status poll failed");
                        continue;
                    }
                };

                let all_closed = result.all_in(&lock_ids, LockState::Closed);
                if last.as_ref() != Some(&result) {
                    sink.report(LockTrackingStatus {
                        key: tracking.key.clone(),
                        bin_id: tracking.bin_id,
                        result: result.clone(),
                        all_closed,
                        timed_out: false,
                    })
                    .await;
                    last = Some(result);
                }

                if all_closed {
                    info!(key = %tracking.key, "Tracked locks closed");
                    break;
                }
            }
        }
    }

    LOCK_TRACKING_ACTIVE.dec();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemorySerialTransport, SimulatedCuBoard};
    use crate::service::{LockControlConfig, LockControlService};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use shared_types::lock::{LockProtocol, LockTarget};

    #[derive(Default)]
    struct RecordingSink {
        reports: Mutex<Vec<LockTrackingStatus>>,
    }

    #[async_trait]
    impl TrackingSink for RecordingSink {
        async fn report(&self, status: LockTrackingStatus) {
            self.reports.lock().push(status);
        }
    }

    impl RecordingSink {
        fn snapshot(&self) -> Vec<LockTrackingStatus> {
            self.reports.lock().clone()
        }
    }

    type Tracker = LockTracker<LockControlService<InMemorySerialTransport>, RecordingSink>;

    async fn setup(config: TrackingConfig) -> (Tracker, Arc<SimulatedCuBoard>, Arc<RecordingSink>) {
        let transport = Arc::new(InMemorySerialTransport::new());
        let board = SimulatedCuBoard::new(1);
        transport.attach("/dev/ttyUSB0", board.clone());
        let service = LockControlService::new(
            LockControlConfig {
                cu_frame_delay: Duration::ZERO,
                ..LockControlConfig::default()
            },
            transport,
        );
        service.initialize().await.unwrap();
        let service = Arc::new(service);

        let target = LockTarget {
            protocol: LockProtocol::Cu,
            device_id: 1,
            lock_id: 7,
        };
        service.execute(LockCommandRequest::open(&target)).await.unwrap();

        let sink = Arc::new(RecordingSink::default());
        (LockTracker::new(config, service, sink.clone()), board, sink)
    }

    fn request(key: &str) -> LockTrackingRequest {
        LockTrackingRequest {
            key: key.to_string(),
            bin_id: None,
            request: LockCommandRequest::status(&LockTarget {
                protocol: LockProtocol::Cu,
                device_id: 1,
                lock_id: 7,
            }),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_change_and_stops_when_closed() {
        let (tracker, board, sink) = setup(TrackingConfig::default()).await;
        tracker.track(request("bin-7"));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        // Still open: exactly one report (the first observation).
        let reports = sink.snapshot();
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].all_closed);
        assert!(tracker.is_tracking("bin-7"));

        board.close(7);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let reports = sink.snapshot();
        assert_eq!(reports.len(), 2);
        assert!(reports[1].all_closed);
        assert!(!reports[1].timed_out);
        assert!(!tracker.is_tracking("bin-7"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_reports_timeout() {
        let config = TrackingConfig {
            poll_interval: Duration::from_secs(1),
            ceiling: Duration::from_secs(5),
        };
        let (tracker, _board, sink) = setup(config).await;
        tracker.track(request("bin-7"));

        tokio::time::sleep(Duration::from_secs(6)).await;

        let reports = sink.snapshot();
        let last = reports.last().unwrap();
        assert!(last.timed_out);
        assert!(!last.all_closed);
        assert!(!tracker.is_tracking("bin-7"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_request_replaces_monitor() {
        let (tracker, _board, sink) = setup(TrackingConfig::default()).await;
        tracker.track(request("bin-7"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        tracker.track(request("bin-7"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Each monitor reports its own first observation.
        assert_eq!(sink.snapshot().len(), 2);
        assert!(tracker.stop("bin-7"));
        assert!(!tracker.is_tracking("bin-7"));
    }
}
