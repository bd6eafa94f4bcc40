//! Transaction entities.
//!
//! A transaction is an ordered list of compartment-scoped steps. Each step
//! carries its plan (what should be taken, put back or left alone) plus the
//! phase it is in, so "where we are" persists as a plain field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::entities::{BinId, ItemId, LoadCellId, UserId};
use shared_types::ipc::{StepId, TransactionId, TransactionType};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Processing,
    AwaitingCorrection,
    Completed,
    CompletedWithError,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithError | Self::Failed | Self::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::AwaitingCorrection => "AWAITING_CORRECTION",
            Self::Completed => "COMPLETED",
            Self::CompletedWithError => "COMPLETED_WITH_ERROR",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared condition of a returned item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemCondition {
    #[default]
    Working,
    Worn,
    Damaged,
}

impl ItemCondition {
    /// Conditions that count against the sensor's damage counter.
    pub fn is_damage(&self) -> bool {
        matches!(self, Self::Damaged)
    }
}

/// One planned item movement on one sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedItem {
    pub item_id: ItemId,
    pub load_cell_id: LoadCellId,
    pub request_qty: i64,
    /// Committed quantity when the compartment was first opened.
    pub snapshot_qty_before_open: Option<i64>,
    /// Only meaningful for returns.
    #[serde(default)]
    pub condition: Option<ItemCondition>,
}

impl PlannedItem {
    pub fn new(item_id: ItemId, load_cell_id: LoadCellId, request_qty: i64) -> Self {
        Self {
            item_id,
            load_cell_id,
            request_qty,
            snapshot_qty_before_open: None,
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: ItemCondition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Plan for one compartment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPlan {
    pub issue: Vec<PlannedItem>,
    #[serde(rename = "return")]
    pub return_items: Vec<PlannedItem>,
    pub replenish: Vec<PlannedItem>,
    pub keep: Vec<PlannedItem>,
}

impl StepPlan {
    pub fn is_empty(&self) -> bool {
        self.issue.is_empty()
            && self.return_items.is_empty()
            && self.replenish.is_empty()
            && self.keep.is_empty()
    }

    /// Every planned item, with the kind of action it stands for.
    pub fn entries(&self) -> impl Iterator<Item = (PlanAction, &PlannedItem)> {
        self.issue
            .iter()
            .map(|i| (PlanAction::Issue, i))
            .chain(self.return_items.iter().map(|i| (PlanAction::Return, i)))
            .chain(self.replenish.iter().map(|i| (PlanAction::Replenish, i)))
            .chain(self.keep.iter().map(|i| (PlanAction::Keep, i)))
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut PlannedItem> {
        self.issue
            .iter_mut()
            .chain(self.return_items.iter_mut())
            .chain(self.replenish.iter_mut())
            .chain(self.keep.iter_mut())
    }

    /// Sensors the plan touches, without duplicates.
    pub fn load_cell_ids(&self) -> Vec<LoadCellId> {
        let mut ids: Vec<LoadCellId> = self.entries().map(|(_, i)| i.load_cell_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanAction {
    Issue,
    Return,
    Replenish,
    /// Must stay untouched.
    Keep,
}

/// Where a step is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepPhase {
    /// Not opened yet (or reset by a resume).
    #[default]
    Ready,
    /// Compartment is open; live polling runs until it re-secures.
    Open,
    /// Compartment re-secured; final validation pending.
    Closed,
    Succeeded,
    Skipped,
}

impl StepPhase {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub id: StepId,
    pub bin_id: BinId,
    pub plan: StepPlan,
    pub phase: StepPhase,
    /// Failed open attempts over the lifetime of the step.
    pub open_failures: u32,
    /// Committed quantity per sensor when the compartment first opened.
    /// Kept across resumes so a corrected step validates against the
    /// original state.
    pub baseline: Option<BTreeMap<LoadCellId, i64>>,
    /// Committed quantity per sensor at the latest open.
    pub opened_with: Option<BTreeMap<LoadCellId, i64>>,
}

impl ExecutionStep {
    pub fn new(bin_id: BinId, plan: StepPlan) -> Self {
        Self {
            id: Uuid::new_v4(),
            bin_id,
            plan,
            phase: StepPhase::Ready,
            open_failures: 0,
            baseline: None,
            opened_with: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// The lock did not open within the attempt bound.
    OpenFailed,
    /// Final quantities did not match the plan.
    Validation,
    /// The compartment was not closed before the tracking ceiling.
    LockTimeout,
    /// Infrastructure error while driving the transaction.
    Fault,
}

/// Why a transaction stopped, for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailure {
    pub kind: FailureKind,
    pub step_id: Option<StepId>,
    pub reason: String,
    pub messages: Vec<String>,
    pub retry_count: u32,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub steps: Vec<ExecutionStep>,
    pub current_step_id: Option<StepId>,
    pub last_error: Option<StepFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(user_id: UserId, kind: TransactionType, steps: Vec<ExecutionStep>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            status: TransactionStatus::Pending,
            current_step_id: steps.first().map(|s| s.id),
            steps,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn current_step(&self) -> Option<&ExecutionStep> {
        let id = self.current_step_id?;
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn current_step_mut(&mut self) -> Option<&mut ExecutionStep> {
        let id = self.current_step_id?;
        self.steps.iter_mut().find(|s| s.id == id)
    }

    pub fn step(&self, id: StepId) -> Option<&ExecutionStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Move `current_step_id` to the first step that is not done.
    /// Returns false when every step is done.
    pub fn advance(&mut self) -> bool {
        self.current_step_id = self.steps.iter().find(|s| !s.phase.is_done()).map(|s| s.id);
        self.current_step_id.is_some()
    }

    pub fn any_skipped(&self) -> bool {
        self.steps.iter().any(|s| s.phase == StepPhase::Skipped)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Audit record of one sensor's committed change in a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEvent {
    pub transaction_id: TransactionId,
    pub step_id: StepId,
    pub load_cell_id: LoadCellId,
    pub item_id: Option<ItemId>,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub quantity_changed: i64,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step() -> ExecutionStep {
        let mut plan = StepPlan::default();
        let cell = Uuid::new_v4();
        plan.issue.push(PlannedItem::new(Uuid::new_v4(), cell, 2));
        plan.keep.push(PlannedItem::new(Uuid::new_v4(), cell, 0));
        ExecutionStep::new(Uuid::new_v4(), plan)
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TransactionStatus::CompletedWithError.is_terminal());
        assert!(TransactionStatus::Cancelled.is_terminal());
        assert!(!TransactionStatus::AwaitingCorrection.is_terminal());
        assert!(!TransactionStatus::Processing.is_terminal());
    }

    #[test]
    fn test_advance_skips_done_steps() {
        let mut tx = Transaction::new(Uuid::new_v4(), TransactionType::Issue, vec![step(), step()]);
        let (first, second) = (tx.steps[0].id, tx.steps[1].id);
        assert_eq!(tx.current_step_id, Some(first));

        tx.steps[0].phase = StepPhase::Skipped;
        assert!(tx.advance());
        assert_eq!(tx.current_step_id, Some(second));
        assert!(tx.any_skipped());

        tx.steps[1].phase = StepPhase::Succeeded;
        assert!(!tx.advance());
        assert!(tx.current_step().is_none());
    }

    #[test]
    fn test_plan_load_cells_deduplicated() {
        assert_eq!(step().plan.load_cell_ids().len(), 1);
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_value(TransactionStatus::AwaitingCorrection).unwrap();
        assert_eq!(json, "AWAITING_CORRECTION");
        assert_eq!(TransactionStatus::CompletedWithError.to_string(), "COMPLETED_WITH_ERROR");
    }
}
