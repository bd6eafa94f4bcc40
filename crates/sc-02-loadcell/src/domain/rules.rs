//! The commit rule shared by the inline and batched ingestion paths.
//!
//! `availableQuantity` is only authoritative while the compartment is secured.
//! While it is open, quantity changes accrue in `pendingChange`; the first
//! sample observed while secured (or an explicit [`commit_pending`] when the
//! compartment re-secures) folds the pending change into the committed count.

use shared_types::entities::LoadCell;

use super::quantity::quantity_at;

/// What applying a sample did to a load cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Error sample, dropped before touching the sensor.
    Ignored,
    /// First sample from unknown hardware; the sensor was created.
    Provisioned,
    /// Sensor is uncalibrated; only the raw weight was recorded.
    RawOnly,
    /// Calibration was armed; this sample became the tare.
    Tared,
    /// Rounded quantity did not move.
    Unchanged,
    /// Quantity moved while the compartment is open.
    Accrued { delta: i64 },
    /// Pending change was folded into the committed quantity.
    Committed { delta: i64, committed: i64 },
}

impl SampleOutcome {
    /// Rounded quantity change this sample produced.
    pub fn delta(&self) -> i64 {
        match self {
            Self::Accrued { delta } | Self::Committed { delta, .. } => *delta,
            _ => 0,
        }
    }

    pub fn committed(&self) -> Option<i64> {
        match self {
            Self::Committed { committed, .. } => Some(*committed),
            _ => None,
        }
    }
}

/// Apply one weight sample to `cell`.
///
/// `secured` is the state of the owning compartment as reported by the lock
/// hardware.
pub fn apply_sample(cell: &mut LoadCell, weight: f64, secured: bool) -> SampleOutcome {
    let previous_weight = cell.reading.current_weight;
    cell.reading.current_weight = weight;

    if !cell.state.is_calibrated {
        return SampleOutcome::RawOnly;
    }

    let Some(zero) = cell.calibration.zero_weight else {
        cell.calibration.zero_weight = Some(weight);
        return SampleOutcome::Tared;
    };

    let unit = cell.calibration.unit_weight;
    let delta = quantity_at(weight, zero, unit) - quantity_at(previous_weight, zero, unit);
    cell.reading.pending_change += delta;

    if secured {
        if let Some(committed) = commit_pending(cell) {
            return SampleOutcome::Committed { delta, committed };
        }
    }

    if delta == 0 {
        SampleOutcome::Unchanged
    } else {
        SampleOutcome::Accrued { delta }
    }
}

/// Fold a nonzero pending change into the committed quantity.
///
/// Returns the committed amount, or `None` when nothing was pending.
pub fn commit_pending(cell: &mut LoadCell) -> Option<i64> {
    let pending = cell.reading.pending_change;
    if pending == 0 {
        return None;
    }
    cell.calibration.available_quantity += pending;
    cell.reading.pending_change = 0;
    cell.is_sync = false;
    Some(pending)
}
