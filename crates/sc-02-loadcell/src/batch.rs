//! Batched ingestion.
//!
//! Samples are buffered per hardware id (last value wins) and written once
//! per window through [`LoadcellService::ingest_batch`]. A timer cycle that
//! fires while another flush is still running is skipped, never queued.
//! Forced flushes (shutdown, or a caller that needs fresh state for a set of
//! sensors) wait for the running flush instead.

use cabinet_telemetry::{time_histogram, BATCH_FLUSHES, BATCH_FLUSH_DURATION, BATCH_FLUSH_SKIPPED};
use parking_lot::Mutex;
use shared_types::entities::HardwareId;
use shared_types::ipc::{SampleStatus, WeightSample};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::ports::{BinStateProvider, LoadcellStore, QuantityPublisher};
use crate::service::{BatchReport, LoadcellService};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Another flush held the guard; this cycle did nothing.
    Skipped,
    /// Nothing was buffered.
    Empty,
    Flushed(BatchReport),
}

pub struct BatchIngestor<S, B, P>
where
    S: LoadcellStore + 'static,
    B: BinStateProvider + 'static,
    P: QuantityPublisher + 'static,
{
    service: Arc<LoadcellService<S, B, P>>,
    window: Duration,
    buffer: Mutex<HashMap<HardwareId, WeightSample>>,
    /// Single-flight guard around the bulk write.
    flushing: tokio::sync::Mutex<()>,
    shutdown: watch::Sender<bool>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<S, B, P> BatchIngestor<S, B, P>
where
    S: LoadcellStore + 'static,
    B: BinStateProvider + 'static,
    P: QuantityPublisher + 'static,
{
    pub fn new(service: Arc<LoadcellService<S, B, P>>) -> Self {
        let window = service.config().batch_window;
        Self {
            service,
            window,
            buffer: Mutex::new(HashMap::new()),
            flushing: tokio::sync::Mutex::new(()),
            shutdown: watch::channel(false).0,
            timer: Mutex::new(None),
        }
    }

    /// Buffer a sample, replacing any earlier one from the same sensor.
    pub fn push(&self, sample: WeightSample) {
        if sample.status == SampleStatus::Error {
            debug!(hardware_id = sample.hardware_id, "Ignoring error sample");
            return;
        }
        self.buffer.lock().insert(sample.hardware_id, sample);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// One timer cycle.
    pub async fn tick(&self) -> FlushOutcome {
        let Ok(_guard) = self.flushing.try_lock() else {
            BATCH_FLUSH_SKIPPED.inc();
            debug!("Flush still running, skipping cycle");
            return FlushOutcome::Skipped;
        };
        let samples = self.drain(None);
        self.flush(samples).await
    }

    /// Flush everything buffered, waiting for a running flush first.
    pub async fn flush_all(&self) -> FlushOutcome {
        let _guard = self.flushing.lock().await;
        let samples = self.drain(None);
        self.flush(samples).await
    }

    /// Flush only the given sensors.
    pub async fn flush_hardware(&self, hardware_ids: &[HardwareId]) -> FlushOutcome {
        let _guard = self.flushing.lock().await;
        let samples = self.drain(Some(hardware_ids));
        self.flush(samples).await
    }

    /// Start the window timer. Each cycle runs on its own task so a slow
    /// flush makes the next cycles skip.
    pub fn start(self: &Arc<Self>) {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return;
        }

        let this = self.clone();
        let mut stop = self.shutdown.subscribe();
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.window);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {
                        let cycle = this.clone();
                        tokio::spawn(async move {
                            cycle.tick().await;
                        });
                    }
                }
            }
        }));
        info!(window_ms = self.window.as_millis() as u64, "Batched ingestion started");
    }

    /// Stop the timer and flush whatever is still buffered.
    pub async fn shutdown(&self) -> FlushOutcome {
        let _ = self.shutdown.send(true);
        let handle = self.timer.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        let outcome = self.flush_all().await;
        info!(?outcome, "Batched ingestion stopped");
        outcome
    }

    fn drain(&self, only: Option<&[HardwareId]>) -> Vec<WeightSample> {
        let mut buffer = self.buffer.lock();
        match only {
            None => buffer.drain().map(|(_, sample)| sample).collect(),
            Some(ids) => ids.iter().filter_map(|id| buffer.remove(id)).collect(),
        }
    }

    async fn flush(&self, samples: Vec<WeightSample>) -> FlushOutcome {
        if samples.is_empty() {
            return FlushOutcome::Empty;
        }
        let _timer = time_histogram!(BATCH_FLUSH_DURATION);
        let count = samples.len();
        let report = self.service.ingest_batch(samples).await;
        BATCH_FLUSHES.inc();
        debug!(
            samples = count,
            applied = report.applied,
            provisioned = report.provisioned,
            failed = report.failed,
            "Batch flushed"
        );
        FlushOutcome::Flushed(report)
    }
}
