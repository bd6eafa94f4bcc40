//! Transaction Service - drives transactions step by step.
//!
//! Every external trigger (start, compartment closed, operator recovery)
//! ends in the same driver loop, which persists the transaction and
//! asks [`next_action`] what to do until the answer is to wait. Calls for one
//! transaction are serialized through a per-transaction gate.

use async_trait::async_trait;
use cabinet_telemetry::{
    log_bin_event, log_tx_event, OPEN_ATTEMPTS, SUBSYSTEM_ERRORS, TRANSACTIONS_AWAITING_CORRECTION,
    TRANSACTIONS_FINALIZED, TRANSACTIONS_STARTED, VALIDATION_VIOLATIONS,
};
use chrono::Utc;
use parking_lot::Mutex;
use shared_bus::MonitorRegistry;
use shared_types::entities::{Bin, BinId, LoadCell, LoadCellId};
use shared_types::ipc::{
    LockTrackingRequest, NoticeLevel, SensorWatch, StepId, TransactionId, TransactionNotice,
};
use shared_types::lock::{LockCommandRequest, LockState};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::domain::{
    next_action, validate, ExecutionStep, FailureKind, IssueLedgerEntry, NextAction, PlanAction,
    Stage, StepFailure, StepPhase, Transaction, TransactionEvent, TransactionStatus,
};
use crate::error::{TransactionError, TransactionResult};
use crate::poller::QuantityPoller;
use crate::ports::{
    AuditLog, BinRepository, CabinetSignals, LedgerRepository, LoadCellGateway, LockGateway,
    NewTransaction, TransactionApi, TransactionRepository,
};

/// Orchestrator configuration.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Open attempts per step before the compartment is flagged failed.
    pub open_attempts: u32,
    /// Pause between open attempts.
    pub retry_delay: Duration,
    /// Settle time between a successful open and the baseline snapshot.
    pub stabilization: Duration,
    /// Live quantity polling interval.
    pub poll_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            open_attempts: 3,
            retry_delay: Duration::from_secs(2),
            stabilization: Duration::from_millis(1500),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Collaborators of the orchestrator.
#[derive(Clone)]
pub struct TransactionPorts {
    pub locks: Arc<dyn LockGateway>,
    pub load_cells: Arc<dyn LoadCellGateway>,
    pub bins: Arc<dyn BinRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub audit: Arc<dyn AuditLog>,
    pub signals: Arc<dyn CabinetSignals>,
}

type Gate = Arc<tokio::sync::Mutex<()>>;

pub struct TransactionService {
    config: OrchestratorConfig,
    ports: TransactionPorts,
    /// Live quantity pollers, one per transaction.
    pollers: MonitorRegistry<TransactionId>,
    gates: Mutex<HashMap<TransactionId, Gate>>,
}

impl TransactionService {
    pub fn new(config: OrchestratorConfig, ports: TransactionPorts) -> Self {
        Self {
            config,
            ports,
            pollers: MonitorRegistry::new("quantity-polling"),
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// True while live polling runs for `id`.
    pub fn is_polling(&self, id: TransactionId) -> bool {
        self.pollers.is_active(&id)
    }

    /// Stop every poller.
    pub async fn shutdown(&self) {
        self.pollers.shutdown().await;
    }

    fn gate(&self, id: TransactionId) -> Gate {
        self.gates.lock().entry(id).or_default().clone()
    }

    fn release_gate(&self, tx: &Transaction) {
        if tx.status.is_terminal() {
            self.gates.lock().remove(&tx.id);
        }
    }

    async fn load(&self, id: TransactionId) -> TransactionResult<Transaction> {
        self.ports
            .transactions
            .get(id)
            .await?
            .ok_or(TransactionError::NotFound { id })
    }

    async fn load_bin(&self, id: BinId) -> TransactionResult<Bin> {
        self.ports
            .bins
            .get(id)
            .await?
            .ok_or(TransactionError::BinNotFound { id })
    }

    async fn save(&self, tx: &mut Transaction) -> TransactionResult<()> {
        tx.touch();
        self.ports.transactions.save(tx).await?;
        Ok(())
    }

    /// Open transaction whose current step is waiting on `bin_id`.
    async fn find_open_on(&self, bin_id: BinId) -> TransactionResult<Option<TransactionId>> {
        let open = self.ports.transactions.list_open().await?;
        Ok(open
            .into_iter()
            .find(|tx| {
                tx.status == TransactionStatus::Processing
                    && tx
                        .current_step()
                        .is_some_and(|s| s.bin_id == bin_id && s.phase == StepPhase::Open)
            })
            .map(|tx| tx.id))
    }

    /// Run the step machine until it has to wait. Must be called with the
    /// transaction's gate held.
    async fn drive(&self, tx: &mut Transaction) -> TransactionResult<()> {
        let result = self.run_steps(tx).await;
        if let Err(e) = &result {
            self.fail(tx, e).await;
        }
        self.release_gate(tx);
        result
    }

    async fn run_steps(&self, tx: &mut Transaction) -> TransactionResult<()> {
        loop {
            let action = next_action(tx);
            debug!(transaction_id = %tx.id, ?action, "Next action");

            match action {
                NextAction::Idle | NextAction::AwaitClose { .. } => return Ok(()),
                NextAction::Start => {
                    tx.status = TransactionStatus::Processing;
                    self.save(tx).await?;
                }
                NextAction::OpenStep { step_id, bin_id } => {
                    self.open_step(tx, step_id, bin_id).await?;
                }
                NextAction::ValidateStep { step_id, bin_id } => {
                    self.validate_step(tx, step_id, bin_id).await?;
                }
                NextAction::Advance => {
                    tx.advance();
                    self.save(tx).await?;
                }
                NextAction::Finalize => {
                    self.finalize(tx).await?;
                }
            }
        }
    }

    async fn open_step(
        &self,
        tx: &mut Transaction,
        step_id: StepId,
        bin_id: BinId,
    ) -> TransactionResult<()> {
        let mut bin = self.load_bin(bin_id).await?;

        if bin.is_failed {
            log_tx_event!(warn, tx.id, "Compartment flagged failed, step passed over", bin_id = %bin_id);
            step_mut(tx, step_id)?.phase = StepPhase::Succeeded;
            return self.save(tx).await;
        }

        let target = bin.lock_target();
        let mut last_fault = String::new();
        let mut opened = false;

        for attempt in 1..=self.config.open_attempts {
            match self.ports.locks.open(&target).await {
                Ok(result) if result.is_success && result.status_of(target.lock_id) == LockState::Open => {
                    opened = true;
                    break;
                }
                Ok(result) => {
                    last_fault = format!("lock {target} reported {:?}", result.status_of(target.lock_id));
                }
                Err(e) => last_fault = e.to_string(),
            }

            let step = step_mut(tx, step_id)?;
            step.open_failures += 1;
            OPEN_ATTEMPTS.with_label_values(&["failed"]).inc();
            log_tx_event!(warn, tx.id, "Open attempt failed", bin_id = %bin_id, attempt, fault = %last_fault);
            self.notify(
                tx,
                NoticeLevel::Warning,
                Some(step_id),
                vec![format!(
                    "Failed to open {} (attempt {attempt} of {})",
                    bin.name, self.config.open_attempts
                )],
            )
            .await;

            if attempt < self.config.open_attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        if !opened {
            bin.is_failed = true;
            self.ports.bins.save(&bin).await?;
            OPEN_ATTEMPTS.with_label_values(&["exhausted"]).inc();

            let retry_count = step_mut(tx, step_id)?.open_failures;
            let reason = format!(
                "Compartment {} failed to open after {} attempts",
                bin.name, self.config.open_attempts
            );
            self.await_correction(
                tx,
                FailureKind::OpenFailed,
                step_id,
                reason,
                vec![last_fault],
                retry_count,
            )
            .await?;
            return Ok(());
        }

        OPEN_ATTEMPTS.with_label_values(&["opened"]).inc();
        bin.is_locked = false;
        self.ports.bins.save(&bin).await?;

        // The step is Open before tracking starts, so a close reported
        // during the settle time still finds it.
        let cells = self.ports.load_cells.load_cells(bin_id).await?;
        let opened_with = committed_quantities(&cells);
        let step = step_mut(tx, step_id)?;
        let baseline = step.baseline.get_or_insert_with(|| opened_with.clone()).clone();
        for item in step.plan.entries_mut() {
            if item.snapshot_qty_before_open.is_none() {
                item.snapshot_qty_before_open = baseline.get(&item.load_cell_id).copied();
            }
        }
        step.opened_with = Some(opened_with);
        step.phase = StepPhase::Open;
        let plan = step.plan.clone();
        self.save(tx).await?;

        self.ports.signals.device_active(bin_id).await;
        self.ports.signals.start_reading(watch(bin_id, &cells)).await;
        self.ports
            .locks
            .track_close(LockTrackingRequest {
                key: bin_id.to_string(),
                bin_id: Some(bin_id),
                request: LockCommandRequest::status(&target),
            })
            .await;

        tokio::time::sleep(self.config.stabilization).await;

        if self.load_bin(bin_id).await?.is_locked {
            log_bin_event!(info, "transactions", bin_id, "Compartment secured while settling", transaction_id = %tx.id);
            self.ports.load_cells.commit_bin(bin_id).await?;
            step_mut(tx, step_id)?.phase = StepPhase::Closed;
            return self.save(tx).await;
        }

        log_bin_event!(info, "transactions", bin_id, "Compartment opened", transaction_id = %tx.id);
        self.ports.signals.bin_opened(bin_id, tx.id, step_id).await;

        let poller = QuantityPoller {
            transaction_id: tx.id,
            kind: tx.kind,
            step_id,
            bin_id,
            plan,
            baseline,
            interval: self.config.poll_interval,
            load_cells: self.ports.load_cells.clone(),
            bins: self.ports.bins.clone(),
            signals: self.ports.signals.clone(),
        };
        self.pollers.start(tx.id, move |cancel| poller.run(cancel));
        Ok(())
    }

    async fn validate_step(
        &self,
        tx: &mut Transaction,
        step_id: StepId,
        bin_id: BinId,
    ) -> TransactionResult<()> {
        let cells = self.ports.load_cells.load_cells(bin_id).await?;
        let step = step_mut(tx, step_id)?.clone();
        let baseline = step.baseline.clone().unwrap_or_default();
        // Plan checks run against the first open; the audit trail records
        // only what changed since this open.
        let opened_with = step.opened_with.clone().unwrap_or_else(|| baseline.clone());

        let mut changes = BTreeMap::new();
        for cell in &cells {
            let after = cell.calibration.available_quantity;
            if let Some(&first) = baseline.get(&cell.id) {
                changes.insert(cell.id, after - first);
            }
            let Some(&before) = opened_with.get(&cell.id) else {
                continue;
            };
            if after != before {
                self.ports
                    .audit
                    .record(TransactionEvent {
                        transaction_id: tx.id,
                        step_id,
                        load_cell_id: cell.id,
                        item_id: cell.item_id,
                        quantity_before: before,
                        quantity_after: after,
                        quantity_changed: after - before,
                        recorded_at: Utc::now(),
                    })
                    .await?;
            }
        }

        let violations = validate(Stage::Final, &step.plan, &changes);
        if !violations.is_empty() {
            VALIDATION_VIOLATIONS
                .with_label_values(&[Stage::Final.as_str()])
                .inc_by(violations.len() as f64);
            let messages: Vec<String> = violations.iter().map(ToString::to_string).collect();
            // Back to Ready so a resume reopens the compartment.
            step_mut(tx, step_id)?.phase = StepPhase::Ready;
            self.await_correction(
                tx,
                FailureKind::Validation,
                step_id,
                format!("Quantities do not match the plan for compartment {bin_id}"),
                messages,
                step.open_failures,
            )
            .await?;
            return Ok(());
        }

        self.settle_ledger(tx, &step).await?;
        step_mut(tx, step_id)?.phase = StepPhase::Succeeded;
        self.save(tx).await?;

        self.ports.signals.stop_reading(watch(bin_id, &cells)).await;
        log_bin_event!(info, "transactions", bin_id, "Step succeeded", transaction_id = %tx.id);
        self.notify(tx, NoticeLevel::Success, Some(step_id), Vec::new())
            .await;
        Ok(())
    }

    async fn settle_ledger(&self, tx: &Transaction, step: &ExecutionStep) -> TransactionResult<()> {
        let mut damaged = false;

        for (action, item) in step.plan.entries() {
            match action {
                PlanAction::Issue => {
                    let mut entry = self
                        .ports
                        .ledger
                        .get(tx.user_id, item.item_id)
                        .await?
                        .unwrap_or_else(|| IssueLedgerEntry::new(tx.user_id, item.item_id));
                    entry.record_issue(step.bin_id, item.load_cell_id, item.request_qty);
                    self.ports.ledger.save(&entry).await?;
                }
                PlanAction::Return => {
                    if let Some(mut entry) = self.ports.ledger.get(tx.user_id, item.item_id).await? {
                        entry.record_return(step.bin_id, item.load_cell_id, item.request_qty);
                        if entry.is_settled() {
                            self.ports.ledger.remove(tx.user_id, item.item_id).await?;
                        } else {
                            self.ports.ledger.save(&entry).await?;
                        }
                    } else {
                        debug!(transaction_id = %tx.id, item_id = %item.item_id, "Return without outstanding issue");
                    }
                    if item.condition.is_some_and(|c| c.is_damage()) {
                        self.ports
                            .load_cells
                            .add_damage(item.load_cell_id, item.request_qty)
                            .await?;
                        damaged = true;
                    }
                }
                PlanAction::Replenish | PlanAction::Keep => {}
            }
        }

        if damaged {
            let mut bin = self.load_bin(step.bin_id).await?;
            bin.is_damaged = true;
            self.ports.bins.save(&bin).await?;
        }
        Ok(())
    }

    async fn finalize(&self, tx: &mut Transaction) -> TransactionResult<()> {
        tx.status = if tx.any_skipped() {
            TransactionStatus::CompletedWithError
        } else {
            TransactionStatus::Completed
        };
        tx.current_step_id = None;
        self.save(tx).await?;

        TRANSACTIONS_FINALIZED
            .with_label_values(&[tx.kind.as_str(), tx.status.as_str()])
            .inc();
        log_tx_event!(info, tx.id, "Transaction finished", status = %tx.status);
        self.ports
            .signals
            .finished(tx.id, tx.kind, tx.status.as_str(), None)
            .await;
        Ok(())
    }

    /// Unrecoverable fault: persist FAILED if the store still accepts it.
    async fn fail(&self, tx: &mut Transaction, error: &TransactionError) {
        SUBSYSTEM_ERRORS
            .with_label_values(&["transactions", error.kind()])
            .inc();
        log_tx_event!(error, tx.id, "Transaction failed", error = %error);

        self.pollers.stop(&tx.id);
        tx.status = TransactionStatus::Failed;
        tx.last_error = Some(StepFailure {
            kind: FailureKind::Fault,
            step_id: tx.current_step_id,
            reason: error.to_string(),
            messages: Vec::new(),
            retry_count: tx.current_step().map_or(0, |s| s.open_failures),
            at: Utc::now(),
        });
        if let Err(e) = self.save(tx).await {
            warn!(transaction_id = %tx.id, error = %e, "Could not persist failed transaction");
        }

        TRANSACTIONS_FINALIZED
            .with_label_values(&[tx.kind.as_str(), tx.status.as_str()])
            .inc();
        self.ports
            .signals
            .finished(tx.id, tx.kind, tx.status.as_str(), Some(error.to_string()))
            .await;
    }

    async fn await_correction(
        &self,
        tx: &mut Transaction,
        kind: FailureKind,
        step_id: StepId,
        reason: String,
        messages: Vec<String>,
        retry_count: u32,
    ) -> TransactionResult<()> {
        tx.status = TransactionStatus::AwaitingCorrection;
        tx.last_error = Some(StepFailure {
            kind,
            step_id: Some(step_id),
            reason: reason.clone(),
            messages: messages.clone(),
            retry_count,
            at: Utc::now(),
        });
        self.save(tx).await?;
        TRANSACTIONS_AWAITING_CORRECTION.inc();

        log_tx_event!(warn, tx.id, "Awaiting correction", step_id = %step_id, reason = %reason);
        let mut errors = vec![reason];
        errors.extend(messages);
        self.notify(tx, NoticeLevel::Error, Some(step_id), errors)
            .await;
        Ok(())
    }

    async fn notify(
        &self,
        tx: &Transaction,
        level: NoticeLevel,
        step_id: Option<StepId>,
        errors: Vec<String>,
    ) {
        self.ports
            .signals
            .notify(
                tx.kind,
                level,
                TransactionNotice {
                    transaction_id: tx.id,
                    step_id,
                    errors,
                },
            )
            .await;
    }

    fn require_awaiting(tx: &Transaction, operation: &'static str) -> TransactionResult<()> {
        if tx.status == TransactionStatus::AwaitingCorrection {
            Ok(())
        } else {
            Err(TransactionError::InvalidState {
                id: tx.id,
                status: tx.status,
                operation,
            })
        }
    }

    async fn stop_sensors(&self, step: &ExecutionStep) {
        match self.ports.load_cells.load_cells(step.bin_id).await {
            Ok(cells) => {
                self.ports
                    .signals
                    .stop_reading(watch(step.bin_id, &cells))
                    .await
            }
            Err(e) => warn!(bin_id = %step.bin_id, error = %e, "Sensor lookup failed"),
        }
    }
}

fn step_mut(tx: &mut Transaction, step_id: StepId) -> TransactionResult<&mut ExecutionStep> {
    let transaction_id = tx.id;
    tx.steps
        .iter_mut()
        .find(|s| s.id == step_id)
        .ok_or(TransactionError::StepNotFound {
            transaction_id,
            step_id,
        })
}

fn watch(bin_id: BinId, cells: &[LoadCell]) -> SensorWatch {
    SensorWatch {
        bin_id,
        hardware_ids: cells.iter().map(|c| c.hardware_id).collect(),
    }
}

#[async_trait]
impl TransactionApi for TransactionService {
    #[instrument(skip(self, request), fields(user_id = %request.user_id, kind = %request.kind))]
    async fn start(&self, request: NewTransaction) -> TransactionResult<Transaction> {
        if request.steps.is_empty() {
            return Err(TransactionError::EmptyPlan);
        }
        for step in &request.steps {
            self.load_bin(step.bin_id).await?;
        }

        let steps = request
            .steps
            .into_iter()
            .map(|s| ExecutionStep::new(s.bin_id, s.plan))
            .collect();
        let mut tx = Transaction::new(request.user_id, request.kind, steps);
        self.ports.transactions.save(&tx).await?;
        TRANSACTIONS_STARTED.with_label_values(&[tx.kind.as_str()]).inc();
        log_tx_event!(info, tx.id, "Transaction started", steps = tx.steps.len());

        let gate = self.gate(tx.id);
        let _guard = gate.lock().await;
        self.drive(&mut tx).await?;
        Ok(tx)
    }

    async fn get(&self, id: TransactionId) -> TransactionResult<Transaction> {
        self.load(id).await
    }

    async fn on_bin_closed(&self, bin_id: BinId) -> TransactionResult<()> {
        let Some(id) = self.find_open_on(bin_id).await? else {
            debug!(bin_id = %bin_id, "Compartment closed outside any step");
            return Ok(());
        };

        let gate = self.gate(id);
        let _guard = gate.lock().await;
        let mut tx = self.load(id).await?;

        // Re-check under the gate; a cancel may have won the race.
        let waiting = tx.status == TransactionStatus::Processing
            && tx
                .current_step()
                .is_some_and(|s| s.bin_id == bin_id && s.phase == StepPhase::Open);
        if !waiting {
            return Ok(());
        }

        self.pollers.stop(&id);
        if let Some(step) = tx.current_step_mut() {
            step.phase = StepPhase::Closed;
        }
        self.save(&mut tx).await?;
        log_bin_event!(info, "transactions", bin_id, "Compartment closed", transaction_id = %id);

        self.drive(&mut tx).await?;
        Ok(())
    }

    async fn on_lock_timeout(&self, bin_id: BinId) -> TransactionResult<()> {
        let Some(id) = self.find_open_on(bin_id).await? else {
            return Ok(());
        };

        let gate = self.gate(id);
        let _guard = gate.lock().await;
        let mut tx = self.load(id).await?;
        let Some(step) = tx.current_step() else {
            return Ok(());
        };
        if tx.status != TransactionStatus::Processing || step.bin_id != bin_id {
            return Ok(());
        }

        let (step_id, retry_count) = (step.id, step.open_failures);
        self.pollers.stop(&id);
        self.await_correction(
            &mut tx,
            FailureKind::LockTimeout,
            step_id,
            format!("Compartment {bin_id} was not closed in time"),
            Vec::new(),
            retry_count,
        )
        .await
    }

    async fn resume(&self, id: TransactionId) -> TransactionResult<Transaction> {
        let gate = self.gate(id);
        let _guard = gate.lock().await;
        let mut tx = self.load(id).await?;
        Self::require_awaiting(&tx, "resume")?;

        let failure = tx.last_error.as_ref().map(|f| f.kind);
        let Some(step) = tx.current_step_mut() else {
            return Err(TransactionError::InvalidState {
                id,
                status: tx.status,
                operation: "resume",
            });
        };
        let bin_id = step.bin_id;
        step.phase = StepPhase::Ready;

        if failure == Some(FailureKind::OpenFailed) {
            let mut bin = self.load_bin(bin_id).await?;
            bin.is_failed = false;
            self.ports.bins.save(&bin).await?;
        }

        tx.status = TransactionStatus::Processing;
        tx.last_error = None;
        self.save(&mut tx).await?;
        TRANSACTIONS_AWAITING_CORRECTION.dec();
        log_tx_event!(info, id, "Transaction resumed", bin_id = %bin_id);

        self.drive(&mut tx).await?;
        Ok(tx)
    }

    async fn skip_step(&self, id: TransactionId) -> TransactionResult<Transaction> {
        let gate = self.gate(id);
        let _guard = gate.lock().await;
        let mut tx = self.load(id).await?;
        Self::require_awaiting(&tx, "skip a step of")?;

        let Some(step) = tx.current_step_mut() else {
            return Err(TransactionError::InvalidState {
                id,
                status: tx.status,
                operation: "skip a step of",
            });
        };
        step.phase = StepPhase::Skipped;
        let step = step.clone();
        self.stop_sensors(&step).await;

        tx.status = TransactionStatus::Processing;
        tx.advance();
        self.save(&mut tx).await?;
        TRANSACTIONS_AWAITING_CORRECTION.dec();
        log_tx_event!(info, id, "Step skipped", step_id = %step.id);

        self.drive(&mut tx).await?;
        Ok(tx)
    }

    async fn cancel(&self, id: TransactionId) -> TransactionResult<Transaction> {
        let gate = self.gate(id);
        let _guard = gate.lock().await;
        let mut tx = self.load(id).await?;
        if tx.status.is_terminal() {
            return Err(TransactionError::InvalidState {
                id,
                status: tx.status,
                operation: "cancel",
            });
        }

        self.pollers.stop(&id);
        if tx.status == TransactionStatus::AwaitingCorrection {
            TRANSACTIONS_AWAITING_CORRECTION.dec();
        }
        if let Some(step) = tx.current_step().filter(|s| s.phase == StepPhase::Open).cloned() {
            self.stop_sensors(&step).await;
        }

        tx.status = TransactionStatus::Cancelled;
        self.save(&mut tx).await?;
        TRANSACTIONS_FINALIZED
            .with_label_values(&[tx.kind.as_str(), tx.status.as_str()])
            .inc();
        log_tx_event!(info, id, "Transaction cancelled");
        self.ports
            .signals
            .finished(tx.id, tx.kind, tx.status.as_str(), Some("cancelled by operator".into()))
            .await;
        self.release_gate(&tx);
        Ok(tx)
    }
}

/// Committed quantities per sensor.
pub fn committed_quantities(cells: &[LoadCell]) -> BTreeMap<LoadCellId, i64> {
    cells
        .iter()
        .map(|c| (c.id, c.calibration.available_quantity))
        .collect()
}
