//! # Bus Message Payloads
//!
//! Payloads carried on the message bus between subsystems.
//!
//! ## Design Rules
//!
//! - Payloads serialize to camelCase JSON.
//! - Request/response pairs are matched by the event's `correlation_id`, never
//!   by payload contents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::entities::{BinId, HardwareId, ItemId, LoadCellId};
use crate::lock::{LockCommandRequest, LockStatusResult};

/// Transaction identifier.
pub type TransactionId = Uuid;

/// Execution step identifier.
pub type StepId = Uuid;

// =============================================================================
// LOADCELL SAMPLING
// =============================================================================

/// Quality flag reported alongside a weight sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleStatus {
    #[default]
    Ok,
    Unstable,
    Error,
}

/// Raw weight sample (`loadcell/weight-calculated`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightSample {
    pub hardware_id: HardwareId,
    pub port_path: String,
    pub weight: f64,
    #[serde(default)]
    pub status: SampleStatus,
    pub timestamp: DateTime<Utc>,
}

impl WeightSample {
    pub fn new(hardware_id: HardwareId, port_path: impl Into<String>, weight: f64) -> Self {
        Self {
            hardware_id,
            port_path: port_path.into(),
            weight,
            status: SampleStatus::Ok,
            timestamp: Utc::now(),
        }
    }
}

/// Quantity change derived from weight (`loadcell/quantity-calculated`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityCalculated {
    pub item_id: Option<ItemId>,
    pub loadcell_id: LoadCellId,
    pub hardware_id: HardwareId,
    pub change_in_quantity: i64,
}

/// Sensor watch request (`loadcell/start-reading`, `loadcell/stop-reading`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorWatch {
    pub bin_id: BinId,
    pub hardware_ids: Vec<HardwareId>,
}

// =============================================================================
// LOCK TRACKING
// =============================================================================

/// Request to watch a lock until it is closed again (`lock/tracking`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockTrackingRequest {
    /// Monitor key; a new request with the same key replaces the old monitor.
    pub key: String,
    pub bin_id: Option<BinId>,
    pub request: LockCommandRequest,
}

/// Progress report of a lock tracking monitor (`lock/tracking-status`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockTrackingStatus {
    pub key: String,
    pub bin_id: Option<BinId>,
    pub result: LockStatusResult,
    pub all_closed: bool,
    pub timed_out: bool,
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Issue,
    Return,
    Replenish,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::Return => "return",
            Self::Replenish => "replenish",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a transaction notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

impl NoticeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Per-step notification (`transaction/<type>/<level>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionNotice {
    pub transaction_id: TransactionId,
    pub step_id: Option<StepId>,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_sample_json_fields() {
        let sample = WeightSample::new(17, "/dev/ttyUSB1", 1234.5);
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["hardwareId"], 17);
        assert_eq!(json["portPath"], "/dev/ttyUSB1");
        assert_eq!(json["status"], "ok");
    }

    #[test]
    fn test_weight_sample_status_defaults() {
        let json = r#"{"hardwareId":3,"portPath":"p","weight":1.0,"timestamp":"2024-01-01T00:00:00Z"}"#;
        let sample: WeightSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.status, SampleStatus::Ok);
    }

    #[test]
    fn test_transaction_type_names() {
        assert_eq!(TransactionType::Replenish.to_string(), "replenish");
        assert_eq!(NoticeLevel::Warning.as_str(), "warning");
    }
}
