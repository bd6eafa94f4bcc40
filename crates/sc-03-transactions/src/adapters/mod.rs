//! Adapters for the orchestrator ports.

pub mod memory;
pub mod mocks;

pub use memory::{
    InMemoryAuditLog, InMemoryBinRepository, InMemoryLedger, InMemoryTransactionRepository,
};
pub use mocks::{InMemoryLoadCells, LockScript, RecordingSignals, ScriptedLockGateway, Signal};
