//! Outbound ports: persistence, compartment state and change notification.

use async_trait::async_trait;
use shared_types::entities::{BinId, HardwareId, LoadCell, LoadCellId, LoadcellPort};
use shared_types::errors::StoreError;
use shared_types::ipc::QuantityCalculated;

/// Sensor and port persistence.
#[async_trait]
pub trait LoadcellStore: Send + Sync {
    async fn find_by_hardware_id(&self, hardware_id: HardwareId)
        -> Result<Option<LoadCell>, StoreError>;

    async fn get(&self, id: LoadCellId) -> Result<Option<LoadCell>, StoreError>;

    /// All sensors, or those mounted in `bin_id`.
    async fn list(&self, bin_id: Option<BinId>) -> Result<Vec<LoadCell>, StoreError>;

    async fn save(&self, cell: &LoadCell) -> Result<(), StoreError>;

    /// Bulk write. One result per input, in order; a failing unit does not
    /// abort the others.
    async fn save_many(&self, cells: &[LoadCell]) -> Vec<Result<(), StoreError>>;

    async fn find_port(&self, path: &str) -> Result<Option<LoadcellPort>, StoreError>;

    async fn save_port(&self, port: &LoadcellPort) -> Result<(), StoreError>;
}

/// Secured state of compartments, as last reported by the lock hardware.
#[async_trait]
pub trait BinStateProvider: Send + Sync {
    /// `None` if the compartment is unknown.
    async fn is_secured(&self, bin_id: BinId) -> Result<Option<bool>, StoreError>;
}

/// Emits `loadcell/quantity-calculated`.
#[async_trait]
pub trait QuantityPublisher: Send + Sync {
    async fn publish_quantity(&self, change: QuantityCalculated);
}
