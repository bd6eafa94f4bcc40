//! # Subsystem Container
//!
//! Builds every subsystem and its adapters around one event bus.
//!
//! ## Initialization Order
//!
//! ```text
//! Level 0: Event bus, cabinet store
//! Level 1: Lock control + tracker, loadcell engine + batch ingestor
//! Level 2: Transaction orchestrator (talks to level 1 over the bus)
//! ```
//!
//! Lock control is generic over the serial transport so the same wiring runs
//! against real ports and simulated boards.

use std::sync::Arc;

use tracing::{info, instrument};

use sc_01_lock_control::{LockControlService, LockTracker, SerialTransport};
use sc_02_loadcell::{BatchIngestor, InMemoryLoadcellStore, LoadcellService};
use sc_03_transactions::adapters::{InMemoryAuditLog, InMemoryLedger, InMemoryTransactionRepository};
use sc_03_transactions::{TransactionPorts, TransactionService};
use shared_bus::InMemoryEventBus;

use crate::adapters::{
    BusCabinetSignals, BusLockGateway, BusQuantityPublisher, BusTrackingSink, LoadcellGateway,
};
use crate::container::config::CabinetConfig;
use crate::container::store::CabinetStore;

pub type ConcreteLockService<T> = LockControlService<T>;

pub type ConcreteTracker<T> = LockTracker<LockControlService<T>, BusTrackingSink>;

pub type ConcreteLoadcellService =
    LoadcellService<InMemoryLoadcellStore, CabinetStore, BusQuantityPublisher>;

pub type ConcreteIngestor = BatchIngestor<InMemoryLoadcellStore, CabinetStore, BusQuantityPublisher>;

/// Every subsystem instance of one cabinet.
pub struct CabinetContainer<T: SerialTransport + 'static> {
    pub config: CabinetConfig,
    pub bus: Arc<InMemoryEventBus>,
    pub store: Arc<CabinetStore>,

    pub locks: Arc<ConcreteLockService<T>>,
    pub tracker: Arc<ConcreteTracker<T>>,

    pub load_cells: Arc<InMemoryLoadcellStore>,
    pub loadcell: Arc<ConcreteLoadcellService>,
    pub ingestor: Arc<ConcreteIngestor>,

    pub lock_gateway: Arc<BusLockGateway>,
    pub transactions: Arc<TransactionService>,
    pub ledger: Arc<InMemoryLedger>,
    pub audit: Arc<InMemoryAuditLog>,
}

impl<T: SerialTransport + 'static> CabinetContainer<T> {
    #[instrument(skip_all, name = "container_init")]
    pub fn new(config: CabinetConfig, transport: Arc<T>) -> Self {
        info!("Initializing cabinet subsystems...");

        // Level 0
        let bus = Arc::new(InMemoryEventBus::with_capacity(config.bus.channel_capacity));
        let store = Arc::new(CabinetStore::new());

        // Level 1
        let locks = Arc::new(LockControlService::new(
            config.lock.service_config(),
            transport,
        ));
        let tracker = Arc::new(LockTracker::new(
            config.lock.tracking_config(),
            locks.clone(),
            Arc::new(BusTrackingSink::new(bus.clone())),
        ));
        info!("  [sc-01] Lock control initialized");

        let load_cells = Arc::new(InMemoryLoadcellStore::new());
        let loadcell = Arc::new(LoadcellService::new(
            config.loadcell.service_config(),
            load_cells.clone(),
            store.clone(),
            Arc::new(BusQuantityPublisher::new(bus.clone())),
        ));
        let ingestor = Arc::new(BatchIngestor::new(loadcell.clone()));
        info!(
            batched = config.loadcell.batched,
            "  [sc-02] Loadcell engine initialized"
        );

        // Level 2
        let lock_gateway = Arc::new(BusLockGateway::new(
            bus.clone(),
            config.bus.request_timeout(),
        ));
        let ledger = Arc::new(InMemoryLedger::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let ports = TransactionPorts {
            locks: lock_gateway.clone(),
            load_cells: Arc::new(LoadcellGateway::new(loadcell.clone())),
            bins: store.clone(),
            transactions: Arc::new(InMemoryTransactionRepository::new()),
            ledger: ledger.clone(),
            audit: audit.clone(),
            signals: Arc::new(BusCabinetSignals::new(bus.clone())),
        };
        let transactions = Arc::new(TransactionService::new(
            config.transaction.service_config(),
            ports,
        ));
        info!("  [sc-03] Transaction orchestrator initialized");

        Self {
            config,
            bus,
            store,
            locks,
            tracker,
            load_cells,
            loadcell,
            ingestor,
            lock_gateway,
            transactions,
            ledger,
            audit,
        }
    }
}
