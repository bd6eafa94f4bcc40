//! Adapters that only publish to the bus.

use async_trait::async_trait;
use cabinet_telemetry::EVENT_BUS_MESSAGES;
use sc_01_lock_control::TrackingSink;
use sc_02_loadcell::QuantityPublisher;
use sc_03_transactions::CabinetSignals;
use shared_bus::{CabinetEvent, EventPublisher, InMemoryEventBus};
use shared_types::entities::BinId;
use shared_types::ipc::{
    LockTrackingStatus, NoticeLevel, QuantityCalculated, SensorWatch, StepId, TransactionId,
    TransactionNotice, TransactionType,
};
use std::sync::Arc;

/// Publish and count an outgoing event.
pub async fn publish(bus: &InMemoryEventBus, event: CabinetEvent) -> usize {
    EVENT_BUS_MESSAGES
        .with_label_values(&[event.topic().as_str(), "sent"])
        .inc();
    bus.publish(event).await
}

pub struct BusCabinetSignals {
    bus: Arc<InMemoryEventBus>,
}

impl BusCabinetSignals {
    pub fn new(bus: Arc<InMemoryEventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl CabinetSignals for BusCabinetSignals {
    async fn device_active(&self, bin_id: BinId) {
        publish(&self.bus, CabinetEvent::DeviceActivated { bin_id }).await;
    }

    async fn start_reading(&self, watch: SensorWatch) {
        publish(&self.bus, CabinetEvent::StartReading(watch)).await;
    }

    async fn stop_reading(&self, watch: SensorWatch) {
        publish(&self.bus, CabinetEvent::StopReading(watch)).await;
    }

    async fn bin_opened(&self, bin_id: BinId, transaction_id: TransactionId, step_id: StepId) {
        publish(
            &self.bus,
            CabinetEvent::BinOpened {
                bin_id,
                transaction_id: Some(transaction_id),
                step_id: Some(step_id),
            },
        )
        .await;
    }

    async fn notify(&self, kind: TransactionType, level: NoticeLevel, notice: TransactionNotice) {
        publish(&self.bus, CabinetEvent::TransactionNotified { kind, level, notice }).await;
    }

    async fn finished(
        &self,
        transaction_id: TransactionId,
        kind: TransactionType,
        status: &str,
        reason: Option<String>,
    ) {
        publish(
            &self.bus,
            CabinetEvent::TransactionFinished {
                transaction_id,
                kind,
                status: status.to_string(),
                reason,
            },
        )
        .await;
    }
}

/// Lock tracking progress to `lock/tracking-status`.
pub struct BusTrackingSink {
    bus: Arc<InMemoryEventBus>,
}

impl BusTrackingSink {
    pub fn new(bus: Arc<InMemoryEventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl TrackingSink for BusTrackingSink {
    async fn report(&self, status: LockTrackingStatus) {
        publish(&self.bus, CabinetEvent::LockTrackingUpdated(status)).await;
    }
}

/// Quantity changes to `loadcell/quantity-calculated`.
pub struct BusQuantityPublisher {
    bus: Arc<InMemoryEventBus>,
}

impl BusQuantityPublisher {
    pub fn new(bus: Arc<InMemoryEventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl QuantityPublisher for BusQuantityPublisher {
    async fn publish_quantity(&self, change: QuantityCalculated) {
        publish(&self.bus, CabinetEvent::QuantityCalculated(change)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::{EventFilter, EventTopic};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_notice_lands_on_transaction_topic() {
        let bus = Arc::new(InMemoryEventBus::new());
        let mut sub = bus.subscribe(EventFilter::topics(vec![EventTopic::Transaction]));
        let signals = BusCabinetSignals::new(bus.clone());

        signals.device_active(Uuid::new_v4()).await;
        signals
            .notify(
                TransactionType::Return,
                NoticeLevel::Error,
                TransactionNotice {
                    transaction_id: Uuid::new_v4(),
                    step_id: None,
                    errors: vec!["return item: fewer than requested".into()],
                },
            )
            .await;

        let event = sub.try_recv().unwrap().unwrap();
        assert_eq!(event.path(), "transaction/return/error");
        assert!(sub.try_recv().unwrap().is_none());
    }
}
