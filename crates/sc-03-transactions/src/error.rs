//! Error types for the transaction orchestrator.

use shared_types::entities::BinId;
use shared_types::errors::StoreError;
use shared_types::ipc::{StepId, TransactionId};
use thiserror::Error;

use crate::domain::TransactionStatus;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Transaction not found: {id}")]
    NotFound { id: TransactionId },

    #[error("Compartment not found: {id}")]
    BinNotFound { id: BinId },

    #[error("Step {step_id} not found in transaction {transaction_id}")]
    StepNotFound {
        transaction_id: TransactionId,
        step_id: StepId,
    },

    /// The operation is not allowed in the transaction's current status.
    #[error("Cannot {operation} transaction {id} in status {status}")]
    InvalidState {
        id: TransactionId,
        status: TransactionStatus,
        operation: &'static str,
    },

    #[error("Transaction has no steps")]
    EmptyPlan,

    /// The lock request could not be delivered or answered.
    #[error("Lock gateway error: {0}")]
    Lock(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TransactionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::BinNotFound { .. } => "bin_not_found",
            Self::StepNotFound { .. } => "step_not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::EmptyPlan => "empty_plan",
            Self::Lock(_) => "lock",
            Self::Store(_) => "store",
        }
    }
}

pub type TransactionResult<T> = Result<T, TransactionError>;
