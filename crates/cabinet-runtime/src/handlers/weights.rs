//! `loadcell/weight-calculated` samples.

use cabinet_telemetry::SUBSYSTEM_ERRORS;
use sc_02_loadcell::LoadcellApi;
use shared_bus::{CabinetEvent, EventFilter, EventTopic, InMemoryEventBus, Subscription};
use std::sync::Arc;
use tracing::{info, warn};

use super::record_received;
use crate::container::{ConcreteIngestor, ConcreteLoadcellService};

/// Feeds weight samples to the quantity engine, inline or through the
/// batch buffer.
pub struct WeightHandler {
    loadcell: Arc<ConcreteLoadcellService>,
    ingestor: Arc<ConcreteIngestor>,
    batched: bool,
    samples: Subscription,
}

impl WeightHandler {
    pub fn new(
        bus: &InMemoryEventBus,
        loadcell: Arc<ConcreteLoadcellService>,
        ingestor: Arc<ConcreteIngestor>,
        batched: bool,
    ) -> Self {
        Self {
            loadcell,
            ingestor,
            batched,
            samples: bus.subscribe(EventFilter::topics(vec![EventTopic::LoadcellWeight])),
        }
    }

    pub async fn run(mut self) {
        info!(batched = self.batched, "Weight sample handler started");

        while let Some(event) = self.samples.recv().await {
            record_received(&event);
            let CabinetEvent::WeightCalculated(sample) = event else {
                continue;
            };

            if self.batched {
                self.ingestor.push(sample);
                continue;
            }

            let hardware_id = sample.hardware_id;
            if let Err(e) = self.loadcell.ingest(sample).await {
                SUBSYSTEM_ERRORS
                    .with_label_values(&["loadcell", e.kind()])
                    .inc();
                warn!(hardware_id, error = %e, "Weight sample dropped");
            }
        }
    }
}
