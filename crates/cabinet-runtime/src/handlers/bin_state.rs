//! # Compartment State
//!
//! Turns `lock/tracking-status` updates into compartment state:
//!
//! ```text
//! lock reported OPEN   -> cabinet store: unlocked
//! all locks CLOSED     -> flush buffered samples -> locked -> commit -> bin/close
//! ```
//!
//! Buffered samples are flushed before the compartment is marked secured so
//! they are still treated as taken while open.

use sc_02_loadcell::LoadcellApi;
use shared_bus::{CabinetEvent, EventFilter, EventTopic, InMemoryEventBus, Subscription};
use shared_types::entities::BinId;
use shared_types::ipc::LockTrackingStatus;
use shared_types::lock::LockState;
use std::sync::Arc;
use tracing::{info, warn};

use cabinet_telemetry::{log_bin_event, SUBSYSTEM_ERRORS};

use super::record_received;
use crate::adapters::publish;
use crate::container::{CabinetStore, ConcreteIngestor, ConcreteLoadcellService};

pub struct BinStateHandler {
    bus: Arc<InMemoryEventBus>,
    store: Arc<CabinetStore>,
    loadcell: Arc<ConcreteLoadcellService>,
    ingestor: Arc<ConcreteIngestor>,
    batched: bool,
    updates: Subscription,
}

impl BinStateHandler {
    pub fn new(
        bus: Arc<InMemoryEventBus>,
        store: Arc<CabinetStore>,
        loadcell: Arc<ConcreteLoadcellService>,
        ingestor: Arc<ConcreteIngestor>,
        batched: bool,
    ) -> Self {
        let updates = bus.subscribe(EventFilter::topics(vec![EventTopic::LockTrackingStatus]));
        Self {
            bus,
            store,
            loadcell,
            ingestor,
            batched,
            updates,
        }
    }

    pub async fn run(mut self) {
        info!("Compartment state handler started");

        while let Some(event) = self.updates.recv().await {
            record_received(&event);
            if let CabinetEvent::LockTrackingUpdated(status) = event {
                self.handle(status).await;
            }
        }
    }

    async fn handle(&self, status: LockTrackingStatus) {
        let Some(bin_id) = status.bin_id else {
            return;
        };

        if status.all_closed {
            self.secure(bin_id).await;
        } else if status
            .result
            .lock_statuses
            .values()
            .any(|state| *state == LockState::Open)
        {
            self.store.set_locked(bin_id, false);
        }
    }

    async fn secure(&self, bin_id: BinId) {
        if self.batched {
            match self.loadcell.get_load_cells(Some(bin_id)).await {
                Ok(cells) => {
                    let hardware_ids: Vec<_> = cells.iter().map(|c| c.hardware_id).collect();
                    self.ingestor.flush_hardware(&hardware_ids).await;
                }
                Err(e) => warn!(bin_id = %bin_id, error = %e, "Could not flush compartment samples"),
            }
        }

        if !self.store.set_locked(bin_id, true) {
            warn!(bin_id = %bin_id, "Close reported for unknown compartment");
        }

        match self.loadcell.commit_bin(bin_id).await {
            Ok(commits) => {
                log_bin_event!(debug, "runtime", bin_id, "Compartment closed", commits = commits.len());
            }
            Err(e) => {
                SUBSYSTEM_ERRORS
                    .with_label_values(&["loadcell", e.kind()])
                    .inc();
                warn!(bin_id = %bin_id, error = %e, "Commit on close failed");
            }
        }

        publish(&self.bus, CabinetEvent::BinClosed { bin_id }).await;
    }
}
