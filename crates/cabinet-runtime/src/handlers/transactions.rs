//! Hardware signals the orchestrator reacts to.

use cabinet_telemetry::SUBSYSTEM_ERRORS;
use sc_03_transactions::{TransactionApi, TransactionError, TransactionService};
use shared_bus::{CabinetEvent, EventFilter, EventTopic, InMemoryEventBus, Subscription};
use std::sync::Arc;
use tracing::{info, warn};

use super::record_received;

/// `bin/close` resumes validation; a tracking timeout pauses the
/// transaction for correction.
pub struct TransactionSignalHandler {
    transactions: Arc<TransactionService>,
    signals: Subscription,
}

impl TransactionSignalHandler {
    pub fn new(bus: &InMemoryEventBus, transactions: Arc<TransactionService>) -> Self {
        Self {
            transactions,
            signals: bus.subscribe(EventFilter::topics(vec![
                EventTopic::BinClose,
                EventTopic::LockTrackingStatus,
            ])),
        }
    }

    pub async fn run(mut self) {
        info!("Transaction signal handler started");

        while let Some(event) = self.signals.recv().await {
            record_received(&event);

            // A close may open the next step of its transaction. Each signal
            // gets its own task; the service serializes per transaction.
            let transactions = self.transactions.clone();
            match event {
                CabinetEvent::BinClosed { bin_id } => {
                    tokio::spawn(async move {
                        if let Err(e) = transactions.on_bin_closed(bin_id).await {
                            report(&e);
                        }
                    });
                }
                CabinetEvent::LockTrackingUpdated(status) if status.timed_out => {
                    let Some(bin_id) = status.bin_id else {
                        continue;
                    };
                    tokio::spawn(async move {
                        if let Err(e) = transactions.on_lock_timeout(bin_id).await {
                            report(&e);
                        }
                    });
                }
                _ => {}
            }
        }
    }
}

fn report(error: &TransactionError) {
    SUBSYSTEM_ERRORS
        .with_label_values(&["transactions", error.kind()])
        .inc();
    warn!(error = %error, "Transaction signal not applied");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::publish;
    use sc_03_transactions::adapters::{
        InMemoryAuditLog, InMemoryBinRepository, InMemoryLedger, InMemoryLoadCells,
        InMemoryTransactionRepository, RecordingSignals, ScriptedLockGateway,
    };
    use sc_03_transactions::{
        NewStep, NewTransaction, OrchestratorConfig, StepPhase, StepPlan, TransactionPorts,
        TransactionStatus,
    };
    use shared_types::entities::{Bin, BinId};
    use shared_types::ipc::TransactionType;
    use shared_types::lock::LockProtocol;
    use std::time::Duration;
    use uuid::Uuid;

    fn request(bins: &[BinId]) -> NewTransaction {
        NewTransaction {
            user_id: Uuid::new_v4(),
            kind: TransactionType::Issue,
            steps: bins
                .iter()
                .map(|&bin_id| NewStep {
                    bin_id,
                    plan: StepPlan::default(),
                })
                .collect(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_not_held_up_by_another_opening() {
        let bins = Arc::new(InMemoryBinRepository::new());
        let mut ids = Vec::new();
        for (name, lock_id) in [("A1", 1), ("A2", 2), ("B1", 3)] {
            let bin = Bin::new(name, LockProtocol::Cu, 0, lock_id);
            ids.push(bin.id);
            bins.insert(bin);
        }
        let (a1, a2, b1) = (ids[0], ids[1], ids[2]);

        let service = Arc::new(TransactionService::new(
            OrchestratorConfig::default(),
            TransactionPorts {
                locks: Arc::new(ScriptedLockGateway::new()),
                load_cells: Arc::new(InMemoryLoadCells::new()),
                bins: bins.clone(),
                transactions: Arc::new(InMemoryTransactionRepository::new()),
                ledger: Arc::new(InMemoryLedger::new()),
                audit: Arc::new(InMemoryAuditLog::new()),
                signals: Arc::new(RecordingSignals::new()),
            },
        ));
        let two_steps = service.start(request(&[a1, a2])).await.unwrap();
        let one_step = service.start(request(&[b1])).await.unwrap();

        let bus = InMemoryEventBus::new();
        tokio::spawn(TransactionSignalHandler::new(&bus, service.clone()).run());

        bins.set_locked(a1, true);
        publish(&bus, CabinetEvent::BinClosed { bin_id: a1 }).await;
        bins.set_locked(b1, true);
        publish(&bus, CabinetEvent::BinClosed { bin_id: b1 }).await;

        // The second step of the first transaction is still settling.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let done = service.get(one_step.id).await.unwrap();
        assert_eq!(done.status, TransactionStatus::Completed);

        let opening = service.get(two_steps.id).await.unwrap();
        assert_eq!(opening.status, TransactionStatus::Processing);
        assert_eq!(opening.steps[0].phase, StepPhase::Succeeded);
        assert_eq!(opening.steps[1].phase, StepPhase::Open);
        assert!(!service.is_polling(two_steps.id));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(service.is_polling(two_steps.id));
    }
}
