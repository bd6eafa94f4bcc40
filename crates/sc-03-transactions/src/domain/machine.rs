//! Step state machine.
//!
//! [`next_action`] looks at a persisted transaction and says what the
//! driver has to do next. The driver performs the action, persists, and asks
//! again until the answer is to wait.

use shared_types::entities::BinId;
use shared_types::ipc::StepId;

use super::entities::{StepPhase, Transaction, TransactionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Terminal, or waiting for an operator decision.
    Idle,
    /// Mark the transaction as processing.
    Start,
    /// Run the open attempt loop for a step.
    OpenStep { step_id: StepId, bin_id: BinId },
    /// Compartment is open; wait for it to re-secure.
    AwaitClose { step_id: StepId, bin_id: BinId },
    /// Compartment re-secured; run final validation.
    ValidateStep { step_id: StepId, bin_id: BinId },
    /// Current step is done; move on.
    Advance,
    /// No steps left.
    Finalize,
}

impl NextAction {
    /// True when the driver should stop and wait for an external signal.
    pub fn is_wait(&self) -> bool {
        matches!(self, Self::Idle | Self::AwaitClose { .. })
    }
}

pub fn next_action(tx: &Transaction) -> NextAction {
    match tx.status {
        TransactionStatus::Pending => NextAction::Start,
        TransactionStatus::Processing => match tx.current_step() {
            None => NextAction::Finalize,
            Some(step) => {
                let (step_id, bin_id) = (step.id, step.bin_id);
                match step.phase {
                    StepPhase::Ready => NextAction::OpenStep { step_id, bin_id },
                    StepPhase::Open => NextAction::AwaitClose { step_id, bin_id },
                    StepPhase::Closed => NextAction::ValidateStep { step_id, bin_id },
                    StepPhase::Succeeded | StepPhase::Skipped => NextAction::Advance,
                }
            }
        },
        _ => NextAction::Idle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ExecutionStep, StepPlan};
    use shared_types::ipc::TransactionType;
    use uuid::Uuid;

    fn transaction() -> Transaction {
        Transaction::new(
            Uuid::new_v4(),
            TransactionType::Issue,
            vec![ExecutionStep::new(Uuid::new_v4(), StepPlan::default())],
        )
    }

    #[test]
    fn test_walks_a_step() {
        let mut tx = transaction();
        assert_eq!(next_action(&tx), NextAction::Start);

        tx.status = TransactionStatus::Processing;
        let (step_id, bin_id) = (tx.steps[0].id, tx.steps[0].bin_id);
        assert_eq!(next_action(&tx), NextAction::OpenStep { step_id, bin_id });

        tx.steps[0].phase = StepPhase::Open;
        assert!(next_action(&tx).is_wait());

        tx.steps[0].phase = StepPhase::Closed;
        assert_eq!(next_action(&tx), NextAction::ValidateStep { step_id, bin_id });

        tx.steps[0].phase = StepPhase::Succeeded;
        assert_eq!(next_action(&tx), NextAction::Advance);

        tx.advance();
        assert_eq!(next_action(&tx), NextAction::Finalize);
    }

    #[test]
    fn test_awaiting_correction_and_terminal_are_idle() {
        let mut tx = transaction();
        for status in [
            TransactionStatus::AwaitingCorrection,
            TransactionStatus::Completed,
            TransactionStatus::Failed,
            TransactionStatus::Cancelled,
        ] {
            tx.status = status;
            assert_eq!(next_action(&tx), NextAction::Idle);
        }
    }
}
