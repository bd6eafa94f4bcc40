//! Ports for the transaction orchestrator.

pub mod inbound;
pub mod outbound;

pub use inbound::{NewStep, NewTransaction, TransactionApi};
pub use outbound::{
    AuditLog, BinRepository, CabinetSignals, LedgerRepository, LoadCellGateway, LockGateway,
    TransactionRepository,
};
