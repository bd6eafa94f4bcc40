//! Live quantity polling while a compartment is open.
//!
//! Every interval the poller reads the sensors of the open compartment,
//! compares `available + pending` with the step baseline and reports plan
//! violations as warnings. A message is sent once per step; it stops when the
//! compartment re-secures or the monitor is cancelled.

use cabinet_telemetry::VALIDATION_VIOLATIONS;
use shared_bus::CancelToken;
use shared_types::entities::{BinId, LoadCellId};
use shared_types::ipc::{NoticeLevel, StepId, TransactionId, TransactionNotice, TransactionType};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::domain::{validate, Stage, StepPlan};
use crate::ports::{BinRepository, CabinetSignals, LoadCellGateway};

pub(crate) struct QuantityPoller {
    pub transaction_id: TransactionId,
    pub kind: TransactionType,
    pub step_id: StepId,
    pub bin_id: BinId,
    pub plan: StepPlan,
    pub baseline: BTreeMap<LoadCellId, i64>,
    pub interval: Duration,
    pub load_cells: Arc<dyn LoadCellGateway>,
    pub bins: Arc<dyn BinRepository>,
    pub signals: Arc<dyn CabinetSignals>,
}

impl QuantityPoller {
    pub async fn run(self, mut cancel: CancelToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sent: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.secured().await {
                        debug!(transaction_id = %self.transaction_id, bin_id = %self.bin_id, "Compartment secured, polling stopped");
                        break;
                    }
                    self.poll_once(&mut sent).await;
                }
            }
        }
    }

    async fn secured(&self) -> bool {
        match self.bins.get(self.bin_id).await {
            Ok(Some(bin)) => bin.is_locked,
            Ok(None) => true,
            Err(e) => {
                warn!(bin_id = %self.bin_id, error = %e, "Compartment lookup failed during polling");
                false
            }
        }
    }

    async fn poll_once(&self, sent: &mut HashSet<String>) {
        let cells = match self.load_cells.load_cells(self.bin_id).await {
            Ok(cells) => cells,
            Err(e) => {
                warn!(bin_id = %self.bin_id, error = %e, "Sensor read failed during polling");
                return;
            }
        };

        let changes: BTreeMap<LoadCellId, i64> = cells
            .iter()
            .filter_map(|cell| {
                let before = self.baseline.get(&cell.id)?;
                Some((cell.id, cell.live_quantity() - before))
            })
            .collect();

        let fresh: Vec<String> = validate(Stage::Live, &self.plan, &changes)
            .iter()
            .map(ToString::to_string)
            .filter(|message| sent.insert(message.clone()))
            .collect();

        if fresh.is_empty() {
            return;
        }

        VALIDATION_VIOLATIONS
            .with_label_values(&[Stage::Live.as_str()])
            .inc_by(fresh.len() as f64);
        self.signals
            .notify(
                self.kind,
                NoticeLevel::Warning,
                TransactionNotice {
                    transaction_id: self.transaction_id,
                    step_id: Some(self.step_id),
                    errors: fresh,
                },
            )
            .await;
    }
}
