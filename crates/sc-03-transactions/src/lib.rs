//! # Transaction Orchestrator
//!
//! **Subsystem ID:** 3
//!
//! ## Purpose
//!
//! Executes issue, return and replenish transactions one compartment at a
//! time: open the lock (bounded retries), watch quantities while the
//! compartment is open, validate the committed change once it re-secures,
//! and keep the outstanding-issue ledger and audit trail current.
//!
//! ## Status Flow
//!
//! ```text
//! PENDING -> PROCESSING -> COMPLETED | COMPLETED_WITH_ERROR | FAILED | CANCELLED
//!                 ^   |
//!          resume |   | open exhausted, validation mismatch, close timeout
//!            skip |   v
//!            AWAITING_CORRECTION
//! ```
//!
//! `AWAITING_CORRECTION` is left only through `resume`, `skip_step` or
//! `cancel`. A resumed step keeps the baseline taken at its first open.
//!
//! ## Module Structure
//!
//! ```text
//! domain/entities.rs   - Transaction, ExecutionStep, StepPlan
//! domain/machine.rs    - next_action
//! domain/validation.rs - live and final plan checks
//! domain/ledger.rs     - outstanding issues per user and item
//! ports/               - TransactionApi and collaborator traits
//! adapters/            - in-memory repositories, scripted fakes
//! poller.rs            - live quantity polling
//! service.rs           - TransactionService
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod domain;
pub mod error;
mod poller;
pub mod ports;
pub mod service;

pub use domain::{
    FailureKind, ItemCondition, PlannedItem, StepFailure, StepPhase, StepPlan, Transaction,
    TransactionEvent, TransactionStatus,
};
pub use error::{TransactionError, TransactionResult};
pub use ports::{
    AuditLog, BinRepository, CabinetSignals, LedgerRepository, LoadCellGateway, LockGateway,
    NewStep, NewTransaction, TransactionApi, TransactionRepository,
};
pub use service::{OrchestratorConfig, TransactionPorts, TransactionService};
