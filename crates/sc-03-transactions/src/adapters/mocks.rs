//! Scripted and recording fakes for the orchestrator's hardware-facing ports.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::entities::{BinId, LoadCell, LoadCellId};
use shared_types::errors::StoreError;
use shared_types::ipc::{
    LockTrackingRequest, NoticeLevel, SensorWatch, StepId, TransactionId, TransactionNotice,
    TransactionType,
};
use shared_types::lock::{LockState, LockStatusResult, LockTarget};
use std::collections::{HashMap, VecDeque};

use crate::error::{TransactionError, TransactionResult};
use crate::ports::{CabinetSignals, LoadCellGateway, LockGateway};

/// Scripted reply of one open attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScript {
    Opens,
    /// Board answers but the lock stays closed.
    StaysClosed,
    /// Request never answered.
    Fault,
}

/// Lock gateway answering from a script; opens once the script runs out.
#[derive(Default)]
pub struct ScriptedLockGateway {
    script: Mutex<VecDeque<LockScript>>,
    attempts: Mutex<Vec<LockTarget>>,
    tracking: Mutex<Vec<LockTrackingRequest>>,
}

impl ScriptedLockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, replies: impl IntoIterator<Item = LockScript>) {
        self.script.lock().extend(replies);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn tracking_requests(&self) -> Vec<LockTrackingRequest> {
        self.tracking.lock().clone()
    }
}

#[async_trait]
impl LockGateway for ScriptedLockGateway {
    async fn open(&self, target: &LockTarget) -> TransactionResult<LockStatusResult> {
        self.attempts.lock().push(*target);
        let reply = self.script.lock().pop_front().unwrap_or(LockScript::Opens);
        let state = match reply {
            LockScript::Opens => LockState::Open,
            LockScript::StaysClosed => LockState::Closed,
            LockScript::Fault => {
                return Err(TransactionError::Lock(format!(
                    "lock/open for {target} timed out"
                )))
            }
        };
        Ok(LockStatusResult {
            device_id: target.device_id,
            is_success: true,
            lock_statuses: [(target.lock_id, state)].into_iter().collect(),
        })
    }

    async fn track_close(&self, request: LockTrackingRequest) {
        self.tracking.lock().push(request);
    }
}

/// Something the orchestrator signalled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    DeviceActive(BinId),
    StartReading(SensorWatch),
    StopReading(SensorWatch),
    BinOpened {
        bin_id: BinId,
        transaction_id: TransactionId,
        step_id: StepId,
    },
    Notice {
        kind: TransactionType,
        level: NoticeLevel,
        notice: TransactionNotice,
    },
    Finished {
        transaction_id: TransactionId,
        status: String,
        reason: Option<String>,
    },
}

#[derive(Default)]
pub struct RecordingSignals {
    signals: Mutex<Vec<Signal>>,
}

impl RecordingSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().clone()
    }

    pub fn notices(&self, level: NoticeLevel) -> Vec<TransactionNotice> {
        self.signals
            .lock()
            .iter()
            .filter_map(|s| match s {
                Signal::Notice { level: l, notice, .. } if *l == level => Some(notice.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, signal: Signal) {
        self.signals.lock().push(signal);
    }
}

#[async_trait]
impl CabinetSignals for RecordingSignals {
    async fn device_active(&self, bin_id: BinId) {
        self.push(Signal::DeviceActive(bin_id));
    }

    async fn start_reading(&self, watch: SensorWatch) {
        self.push(Signal::StartReading(watch));
    }

    async fn stop_reading(&self, watch: SensorWatch) {
        self.push(Signal::StopReading(watch));
    }

    async fn bin_opened(&self, bin_id: BinId, transaction_id: TransactionId, step_id: StepId) {
        self.push(Signal::BinOpened {
            bin_id,
            transaction_id,
            step_id,
        });
    }

    async fn notify(&self, kind: TransactionType, level: NoticeLevel, notice: TransactionNotice) {
        self.push(Signal::Notice {
            kind,
            level,
            notice,
        });
    }

    async fn finished(
        &self,
        transaction_id: TransactionId,
        _kind: TransactionType,
        status: &str,
        reason: Option<String>,
    ) {
        self.push(Signal::Finished {
            transaction_id,
            status: status.to_string(),
            reason,
        });
    }
}

/// Sensor state the tests set directly.
#[derive(Default)]
pub struct InMemoryLoadCells {
    cells: Mutex<HashMap<LoadCellId, LoadCell>>,
}

impl InMemoryLoadCells {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, cell: LoadCell) {
        self.cells.lock().insert(cell.id, cell);
    }

    /// Set the live pending change of a sensor.
    pub fn set_pending(&self, id: LoadCellId, pending: i64) {
        if let Some(cell) = self.cells.lock().get_mut(&id) {
            cell.reading.pending_change = pending;
        }
    }

    /// Fold the pending change into the committed quantity.
    pub fn commit(&self, id: LoadCellId) {
        if let Some(cell) = self.cells.lock().get_mut(&id) {
            cell.calibration.available_quantity += cell.reading.pending_change;
            cell.reading.pending_change = 0;
        }
    }

    pub fn get(&self, id: LoadCellId) -> Option<LoadCell> {
        self.cells.lock().get(&id).cloned()
    }
}

#[async_trait]
impl LoadCellGateway for InMemoryLoadCells {
    async fn load_cells(&self, bin_id: BinId) -> Result<Vec<LoadCell>, StoreError> {
        Ok(self
            .cells
            .lock()
            .values()
            .filter(|c| c.bin_id == Some(bin_id))
            .cloned()
            .collect())
    }

    async fn add_damage(&self, id: LoadCellId, quantity: i64) -> Result<(), StoreError> {
        let mut cells = self.cells.lock();
        let cell = cells
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("load cell", id))?;
        cell.calibration.damage_quantity += quantity;
        Ok(())
    }

    async fn commit_bin(&self, bin_id: BinId) -> Result<(), StoreError> {
        for cell in self
            .cells
            .lock()
            .values_mut()
            .filter(|c| c.bin_id == Some(bin_id))
        {
            cell.calibration.available_quantity += cell.reading.pending_change;
            cell.reading.pending_change = 0;
        }
        Ok(())
    }
}
