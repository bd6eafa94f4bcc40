//! Inbound port: what the rest of the cabinet may ask of the loadcell engine.

use async_trait::async_trait;
use shared_types::entities::{BinId, ItemId, LoadCell, LoadCellId};
use shared_types::ipc::WeightSample;

use crate::domain::SampleOutcome;
use crate::error::LoadcellResult;

#[async_trait]
pub trait LoadcellApi: Send + Sync {
    /// Apply a single weight sample (inline path).
    async fn ingest(&self, sample: WeightSample) -> LoadcellResult<SampleOutcome>;

    /// Commit pending changes of every sensor in a compartment that was just
    /// re-secured. Returns `(sensor, committed delta)` for each commit.
    async fn commit_bin(&self, bin_id: BinId) -> LoadcellResult<Vec<(LoadCellId, i64)>>;

    /// Sensors, optionally limited to one compartment.
    async fn get_load_cells(&self, bin_id: Option<BinId>) -> LoadcellResult<Vec<LoadCell>>;

    /// Arm calibration: the next sample becomes the tare for `quantity` items.
    async fn calibrate(
        &self,
        id: LoadCellId,
        unit_weight: f64,
        quantity: i64,
        max_quantity: i64,
    ) -> LoadcellResult<LoadCell>;

    /// Swap (or move, when `to` is uncalibrated) calibration and item between
    /// two sensors on the same port.
    async fn move_calibration(&self, from: LoadCellId, to: LoadCellId) -> LoadcellResult<()>;

    /// Mount a sensor in a compartment holding `item_id`.
    async fn activate(
        &self,
        id: LoadCellId,
        bin_id: BinId,
        item_id: Option<ItemId>,
    ) -> LoadcellResult<LoadCell>;

    async fn deactivate(&self, id: LoadCellId) -> LoadcellResult<LoadCell>;

    /// Count `quantity` returned items as damaged on this sensor.
    async fn add_damage(&self, id: LoadCellId, quantity: i64) -> LoadcellResult<LoadCell>;
}
