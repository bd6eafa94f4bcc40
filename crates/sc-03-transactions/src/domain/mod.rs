//! Transaction domain: entities, step machine, validation and ledger.

pub mod entities;
pub mod ledger;
pub mod machine;
pub mod validation;

pub use entities::{
    ExecutionStep, FailureKind, ItemCondition, PlanAction, PlannedItem, StepFailure, StepPhase, StepPlan,
    Transaction, TransactionEvent, TransactionStatus,
};
pub use ledger::{IssueLedgerEntry, LedgerLocation};
pub use machine::{next_action, NextAction};
pub use validation::{validate, Stage, Violation, ViolationKind};
