//! Outbound ports of the orchestrator.

use async_trait::async_trait;
use shared_types::entities::{Bin, BinId, ItemId, LoadCell, LoadCellId, UserId};
use shared_types::errors::StoreError;
use shared_types::ipc::{
    LockTrackingRequest, NoticeLevel, SensorWatch, StepId, TransactionId, TransactionNotice,
    TransactionType,
};
use shared_types::lock::{LockStatusResult, LockTarget};

use crate::domain::{IssueLedgerEntry, Transaction, TransactionEvent};
use crate::error::TransactionResult;

/// Lock control, reached over the bus.
#[async_trait]
pub trait LockGateway: Send + Sync {
    async fn open(&self, target: &LockTarget) -> TransactionResult<LockStatusResult>;

    /// Ask lock control to watch the lock until it is closed again.
    async fn track_close(&self, request: LockTrackingRequest);
}

/// Read access to the quantity engine's persisted state, plus the damage
/// counter it owns.
#[async_trait]
pub trait LoadCellGateway: Send + Sync {
    async fn load_cells(&self, bin_id: BinId) -> Result<Vec<LoadCell>, StoreError>;

    async fn add_damage(&self, id: LoadCellId, quantity: i64) -> Result<(), StoreError>;

    /// Fold pending changes of a re-secured compartment into its stock.
    async fn commit_bin(&self, bin_id: BinId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait BinRepository: Send + Sync {
    async fn get(&self, id: BinId) -> Result<Option<Bin>, StoreError>;

    async fn save(&self, bin: &Bin) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError>;

    async fn save(&self, transaction: &Transaction) -> Result<(), StoreError>;

    /// Transactions that are not terminal.
    async fn list_open(&self) -> Result<Vec<Transaction>, StoreError>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn get(&self, user_id: UserId, item_id: ItemId)
        -> Result<Option<IssueLedgerEntry>, StoreError>;

    async fn save(&self, entry: &IssueLedgerEntry) -> Result<(), StoreError>;

    async fn remove(&self, user_id: UserId, item_id: ItemId) -> Result<(), StoreError>;
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, event: TransactionEvent) -> Result<(), StoreError>;
}

/// Outgoing signals to sensors, displays and upstream systems.
#[async_trait]
pub trait CabinetSignals: Send + Sync {
    async fn device_active(&self, bin_id: BinId);

    async fn start_reading(&self, watch: SensorWatch);

    async fn stop_reading(&self, watch: SensorWatch);

    async fn bin_opened(&self, bin_id: BinId, transaction_id: TransactionId, step_id: StepId);

    async fn notify(&self, kind: TransactionType, level: NoticeLevel, notice: TransactionNotice);

    async fn finished(
        &self,
        transaction_id: TransactionId,
        kind: TransactionType,
        status: &str,
        reason: Option<String>,
    );
}
