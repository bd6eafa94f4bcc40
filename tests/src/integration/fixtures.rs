//! A one-compartment cabinet on simulated hardware, wired by the real
//! runtime.

use std::sync::Arc;
use std::time::Duration;

use cabinet_runtime::{CabinetConfig, CabinetContainer, CabinetRuntime};
use sc_01_lock_control::{InMemorySerialTransport, SimulatedCuBoard};
use sc_02_loadcell::{LoadcellApi, SampleOutcome};
use sc_03_transactions::{
    NewStep, NewTransaction, PlannedItem, StepPlan, Transaction, TransactionApi,
    TransactionStatus,
};
use shared_bus::{CabinetEvent, EventPublisher};
use shared_types::entities::{Bin, BinId, HardwareId, ItemId, LoadCell, LoadCellId};
use shared_types::ipc::{TransactionType, WeightSample};
use shared_types::lock::LockProtocol;
use uuid::Uuid;

pub const CU_PORT: &str = "/dev/ttySIM0";
pub const LOADCELL_PORT: &str = "/dev/ttyLC0";
pub const HARDWARE_ID: HardwareId = 7;
pub const LOCK_ID: u8 = 12;

/// Tare weight of the shelf; items weigh 50 g each.
pub const TARE: f64 = 1000.0;
pub const UNIT_WEIGHT: f64 = 50.0;
pub const STOCK: i64 = 10;

pub fn config(batched: bool) -> CabinetConfig {
    let mut config = CabinetConfig::default();
    config.lock.cu_frame_delay_ms = 0;
    config.loadcell.batched = batched;
    config
}

pub struct SimulatedCabinet {
    pub runtime: CabinetRuntime<InMemorySerialTransport>,
    pub board: Arc<SimulatedCuBoard>,
    pub bin_id: BinId,
    pub cell_id: LoadCellId,
    pub item_id: ItemId,
    pub user_id: Uuid,
}

impl SimulatedCabinet {
    /// Start the runtime, register compartment A1 (CU 0/12) and mount a
    /// calibrated sensor holding [`STOCK`] items.
    pub async fn start(config: CabinetConfig) -> Self {
        let transport = Arc::new(InMemorySerialTransport::new());
        let board = SimulatedCuBoard::new(0);
        transport.attach(CU_PORT, board.clone());

        let runtime = CabinetRuntime::new(config, transport);
        runtime.start().await.unwrap();
        let c = runtime.container();

        let bin = Bin::new("A1", LockProtocol::Cu, 0, LOCK_ID);
        let bin_id = bin.id;
        c.store.insert(bin);

        let loadcell = &c.loadcell;
        assert_eq!(
            loadcell.ingest(sample(TARE)).await.unwrap(),
            SampleOutcome::Provisioned
        );
        let cell = loadcell
            .get_load_cells(None)
            .await
            .unwrap()
            .into_iter()
            .find(|cell| cell.hardware_id == HARDWARE_ID)
            .unwrap();
        let item_id = Uuid::new_v4();
        loadcell.activate(cell.id, bin_id, Some(item_id)).await.unwrap();
        loadcell.calibrate(cell.id, UNIT_WEIGHT, STOCK, 20).await.unwrap();
        assert_eq!(
            loadcell.ingest(sample(TARE)).await.unwrap(),
            SampleOutcome::Tared
        );

        Self {
            runtime,
            board,
            bin_id,
            cell_id: cell.id,
            item_id,
            user_id: Uuid::new_v4(),
        }
    }

    pub fn container(&self) -> Arc<CabinetContainer<InMemorySerialTransport>> {
        self.runtime.container()
    }

    pub fn issue(&self, quantity: i64) -> NewTransaction {
        NewTransaction {
            user_id: self.user_id,
            kind: TransactionType::Issue,
            steps: vec![NewStep {
                bin_id: self.bin_id,
                plan: StepPlan {
                    issue: vec![PlannedItem::new(self.item_id, self.cell_id, quantity)],
                    ..StepPlan::default()
                },
            }],
        }
    }

    /// Put a weight sample on the bus and let the handlers apply it.
    pub async fn weigh(&self, weight: f64) {
        self.container()
            .bus
            .publish(CabinetEvent::WeightCalculated(sample(weight)))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    pub async fn cell(&self) -> LoadCell {
        self.container()
            .loadcell
            .get_load_cells(Some(self.bin_id))
            .await
            .unwrap()
            .into_iter()
            .find(|cell| cell.id == self.cell_id)
            .unwrap()
    }

    /// Poll until the transaction reaches `status`; panics after a minute of
    /// (virtual) time.
    pub async fn wait_for(&self, id: Uuid, status: TransactionStatus) -> Transaction {
        let transactions = self.container().transactions.clone();
        for _ in 0..240 {
            let tx = transactions.get(id).await.unwrap();
            if tx.status == status {
                return tx;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        let tx = transactions.get(id).await.unwrap();
        panic!("transaction stuck in {:?}, expected {status:?}", tx.status);
    }
}

pub fn sample(weight: f64) -> WeightSample {
    WeightSample::new(HARDWARE_ID, LOADCELL_PORT, weight)
}
