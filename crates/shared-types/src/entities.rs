//! # Core Domain Entities
//!
//! Physical cabinet entities shared by the loadcell engine and the
//! transaction orchestrator.
//!
//! ## Clusters
//!
//! - **Compartments**: `Bin` with its lock address and hardware-reported state
//! - **Sensors**: `LoadCell`, its `Calibration` block and `LiveReading`
//! - **Ports**: `LoadcellPort`, the hardware path a sensor reports through

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lock::{LockProtocol, LockTarget};

/// Compartment identifier.
pub type BinId = Uuid;

/// Loadcell (sensor) identifier.
pub type LoadCellId = Uuid;

/// Catalogue item identifier.
pub type ItemId = Uuid;

/// Cabinet user identifier.
pub type UserId = Uuid;

/// Loadcell port record identifier.
pub type PortId = Uuid;

/// Stable identifier burned into loadcell hardware.
pub type HardwareId = u32;

// =============================================================================
// COMPARTMENTS
// =============================================================================

/// A lockable storage compartment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bin {
    pub id: BinId,
    pub name: String,
    pub protocol: LockProtocol,
    pub lock_device_id: u8,
    pub lock_id: u8,
    /// Secured state as last reported by the lock hardware.
    pub is_locked: bool,
    /// Set after repeated open failures; cleared by an explicit resume.
    pub is_failed: bool,
    pub is_damaged: bool,
    pub load_cell_ids: Vec<LoadCellId>,
}

impl Bin {
    pub fn new(name: impl Into<String>, protocol: LockProtocol, device_id: u8, lock_id: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            protocol,
            lock_device_id: device_id,
            lock_id,
            is_locked: true,
            is_failed: false,
            is_damaged: false,
            load_cell_ids: Vec::new(),
        }
    }

    pub fn lock_target(&self) -> LockTarget {
        LockTarget {
            protocol: self.protocol,
            device_id: self.lock_device_id,
            lock_id: self.lock_id,
        }
    }
}

// =============================================================================
// SENSORS
// =============================================================================

/// Calibration block of a loadcell.
///
/// `zero_weight == None` means calibration is armed and the next sample
/// becomes the tare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Calibration {
    pub zero_weight: Option<f64>,
    pub unit_weight: f64,
    /// Committed item count. Authoritative only while the bin is secured.
    pub available_quantity: i64,
    pub max_quantity: i64,
    pub damage_quantity: i64,
}

/// Most recent reading of a loadcell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LiveReading {
    pub current_weight: f64,
    /// Provisional delta accrued while the bin is unsecured.
    pub pending_change: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoadCellState {
    pub is_calibrated: bool,
    pub is_running: bool,
}

/// A weight-sensing shelf position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadCell {
    pub id: LoadCellId,
    pub hardware_id: HardwareId,
    pub port_id: PortId,
    pub port_path: String,
    pub bin_id: Option<BinId>,
    pub item_id: Option<ItemId>,
    pub calibration: Calibration,
    pub reading: LiveReading,
    pub state: LoadCellState,
    /// False once a commit changed `available_quantity` and no upstream
    /// mirror has acknowledged it yet.
    pub is_sync: bool,
}

impl LoadCell {
    /// A freshly discovered sensor, tared provisionally at `first_weight`.
    pub fn provisioned(
        hardware_id: HardwareId,
        port_id: PortId,
        port_path: impl Into<String>,
        first_weight: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            hardware_id,
            port_id,
            port_path: port_path.into(),
            bin_id: None,
            item_id: None,
            calibration: Calibration {
                zero_weight: Some(first_weight),
                ..Calibration::default()
            },
            reading: LiveReading {
                current_weight: first_weight,
                pending_change: 0,
            },
            state: LoadCellState::default(),
            is_sync: true,
        }
    }

    /// Committed quantity plus whatever is still pending.
    pub fn live_quantity(&self) -> i64 {
        self.calibration.available_quantity + self.reading.pending_change
    }
}

/// Hardware path through which loadcells report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadcellPort {
    pub id: PortId,
    pub path: String,
    pub is_active: bool,
}

impl LoadcellPort {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            is_active: true,
        }
    }
}
