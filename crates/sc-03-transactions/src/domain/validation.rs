//! Plan validation.
//!
//! The same rules run twice per step: while the compartment is open
//! (against live quantities, informational) and once it has re-secured
//! (against committed quantities, strict).

use shared_types::entities::{ItemId, LoadCellId};
use std::collections::BTreeMap;
use std::fmt;

use super::entities::{PlanAction, StepPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Compartment open; partial progress is tolerated.
    Live,
    /// Compartment secured; every planned action must match exactly.
    Final,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Final => "final",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Issue: quantity went up.
    AddedInstead,
    OverPicked,
    UnderPicked,
    /// Return/replenish: quantity went down.
    RemovedInstead,
    Excess,
    Short,
    /// Planned action with no observed change.
    NoChange,
    /// Keep-untouched entry changed.
    Touched,
}

impl ViolationKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AddedInstead => "added instead of taken",
            Self::OverPicked => "over-picked",
            Self::UnderPicked => "under-picked",
            Self::RemovedInstead => "removed instead of added",
            Self::Excess => "more than requested",
            Self::Short => "fewer than requested",
            Self::NoChange => "no change detected",
            Self::Touched => "should not have been touched",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Violation {
    pub action: PlanAction,
    pub kind: ViolationKind,
    pub item_id: ItemId,
    pub load_cell_id: LoadCellId,
    pub requested: i64,
    /// Signed quantity change on the sensor.
    pub observed: i64,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self.action {
            PlanAction::Issue => "issue",
            PlanAction::Return => "return",
            PlanAction::Replenish => "replenish",
            PlanAction::Keep => "keep",
        };
        write!(
            f,
            "{action} item {}: {} (requested {}, observed change {})",
            self.item_id,
            self.kind.label(),
            self.requested,
            self.observed
        )
    }
}

/// Classify observed changes (per sensor, `after - baseline`) against `plan`.
/// Sensors absent from `changes` count as unchanged.
pub fn validate(
    stage: Stage,
    plan: &StepPlan,
    changes: &BTreeMap<LoadCellId, i64>,
) -> Vec<Violation> {
    plan.entries()
        .filter_map(|(action, item)| {
            let change = changes.get(&item.load_cell_id).copied().unwrap_or(0);
            classify(stage, action, item.request_qty, change).map(|kind| Violation {
                action,
                kind,
                item_id: item.item_id,
                load_cell_id: item.load_cell_id,
                requested: item.request_qty,
                observed: change,
            })
        })
        .collect()
}

fn classify(stage: Stage, action: PlanAction, requested: i64, change: i64) -> Option<ViolationKind> {
    let strict = stage == Stage::Final;
    match action {
        PlanAction::Keep => (change != 0).then_some(ViolationKind::Touched),
        PlanAction::Issue => {
            let taken = -change;
            if taken < 0 {
                Some(ViolationKind::AddedInstead)
            } else if taken == 0 {
                (strict && requested != 0).then_some(ViolationKind::NoChange)
            } else if taken > requested {
                Some(ViolationKind::OverPicked)
            } else if taken < requested {
                Some(ViolationKind::UnderPicked)
            } else {
                None
            }
        }
        PlanAction::Return | PlanAction::Replenish => {
            let added = change;
            if added < 0 {
                Some(ViolationKind::RemovedInstead)
            } else if added > requested {
                Some(ViolationKind::Excess)
            } else if !strict || added == requested {
                None
            } else if added == 0 {
                Some(ViolationKind::NoChange)
            } else {
                Some(ViolationKind::Short)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::PlannedItem;
    use uuid::Uuid;

    fn issue_plan(requested: i64) -> (StepPlan, LoadCellId) {
        let cell = Uuid::new_v4();
        let mut plan = StepPlan::default();
        plan.issue.push(PlannedItem::new(Uuid::new_v4(), cell, requested));
        (plan, cell)
    }

    fn kinds(stage: Stage, plan: &StepPlan, cell: LoadCellId, change: i64) -> Vec<ViolationKind> {
        let changes = BTreeMap::from([(cell, change)]);
        validate(stage, plan, &changes).into_iter().map(|v| v.kind).collect()
    }

    #[test]
    fn test_issue_table() {
        let (plan, cell) = issue_plan(5);
        assert!(kinds(Stage::Final, &plan, cell, -5).is_empty());
        assert_eq!(kinds(Stage::Final, &plan, cell, -3), vec![ViolationKind::UnderPicked]);
        assert_eq!(kinds(Stage::Final, &plan, cell, 2), vec![ViolationKind::AddedInstead]);
        assert_eq!(kinds(Stage::Final, &plan, cell, -6), vec![ViolationKind::OverPicked]);
        assert_eq!(kinds(Stage::Final, &plan, cell, 0), vec![ViolationKind::NoChange]);
    }

    #[test]
    fn test_issue_live_reports_partial_but_not_idle() {
        let (plan, cell) = issue_plan(5);
        assert!(kinds(Stage::Live, &plan, cell, 0).is_empty());
        assert_eq!(kinds(Stage::Live, &plan, cell, -3), vec![ViolationKind::UnderPicked]);
        assert_eq!(kinds(Stage::Live, &plan, cell, 1), vec![ViolationKind::AddedInstead]);
    }

    #[test]
    fn test_return_tolerates_short_while_live() {
        let cell = Uuid::new_v4();
        let mut plan = StepPlan::default();
        plan.return_items.push(PlannedItem::new(Uuid::new_v4(), cell, 3));

        assert!(kinds(Stage::Live, &plan, cell, 1).is_empty());
        assert_eq!(kinds(Stage::Live, &plan, cell, 4), vec![ViolationKind::Excess]);
        assert_eq!(kinds(Stage::Live, &plan, cell, -1), vec![ViolationKind::RemovedInstead]);

        assert_eq!(kinds(Stage::Final, &plan, cell, 1), vec![ViolationKind::Short]);
        assert_eq!(kinds(Stage::Final, &plan, cell, 0), vec![ViolationKind::NoChange]);
        assert!(kinds(Stage::Final, &plan, cell, 3).is_empty());
    }

    #[test]
    fn test_keep_any_change_is_error() {
        let cell = Uuid::new_v4();
        let mut plan = StepPlan::default();
        plan.keep.push(PlannedItem::new(Uuid::new_v4(), cell, 0));

        for stage in [Stage::Live, Stage::Final] {
            assert_eq!(kinds(stage, &plan, cell, 1), vec![ViolationKind::Touched]);
            assert_eq!(kinds(stage, &plan, cell, -1), vec![ViolationKind::Touched]);
            assert!(kinds(stage, &plan, cell, 0).is_empty());
        }
    }

    #[test]
    fn test_missing_sensor_counts_as_unchanged() {
        let (plan, _) = issue_plan(1);
        let violations = validate(Stage::Final, &plan, &BTreeMap::new());
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::NoChange);
        assert!(violations[0].to_string().contains("no change detected"));
    }

    #[test]
    fn test_message_names_the_problem() {
        let (plan, cell) = issue_plan(5);
        let changes = BTreeMap::from([(cell, -3)]);
        let message = validate(Stage::Final, &plan, &changes)[0].to_string();
        assert!(message.starts_with("issue item"));
        assert!(message.contains("under-picked"));
        assert!(message.contains("requested 5"));
    }
}
