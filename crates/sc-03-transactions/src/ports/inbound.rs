//! Inbound port: starting, driving and recovering transactions.

use async_trait::async_trait;
use shared_types::entities::{BinId, UserId};
use shared_types::ipc::{TransactionId, TransactionType};

use crate::domain::{StepPlan, Transaction};
use crate::error::TransactionResult;

/// One compartment of a new transaction.
#[derive(Debug, Clone)]
pub struct NewStep {
    pub bin_id: BinId,
    pub plan: StepPlan,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: UserId,
    pub kind: TransactionType,
    pub steps: Vec<NewStep>,
}

#[async_trait]
pub trait TransactionApi: Send + Sync {
    /// Create a transaction and start executing its first step.
    async fn start(&self, request: NewTransaction) -> TransactionResult<Transaction>;

    async fn get(&self, id: TransactionId) -> TransactionResult<Transaction>;

    /// Hardware reports the compartment secured again.
    async fn on_bin_closed(&self, bin_id: BinId) -> TransactionResult<()>;

    /// The compartment was not closed before the tracking ceiling.
    async fn on_lock_timeout(&self, bin_id: BinId) -> TransactionResult<()>;

    /// Retry the current step after the operator corrected the problem.
    async fn resume(&self, id: TransactionId) -> TransactionResult<Transaction>;

    /// Give up on the current step and continue with the next.
    async fn skip_step(&self, id: TransactionId) -> TransactionResult<Transaction>;

    async fn cancel(&self, id: TransactionId) -> TransactionResult<Transaction>;
}
