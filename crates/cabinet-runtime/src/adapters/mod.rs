//! # Adapters
//!
//! Port implementations that connect the subsystems through the event bus.
//!
//! | Adapter | Port | Crate |
//! |---------|------|-------|
//! | `BusLockGateway` | `LockGateway` | sc-03 |
//! | `BusCabinetSignals` | `CabinetSignals` | sc-03 |
//! | `LoadcellGateway` | `LoadCellGateway` | sc-03 |
//! | `BusTrackingSink` | `TrackingSink` | sc-01 |
//! | `BusQuantityPublisher` | `QuantityPublisher` | sc-02 |

pub mod bus;
pub mod loadcells;
pub mod locks;

pub use bus::{publish, BusCabinetSignals, BusQuantityPublisher, BusTrackingSink};
pub use loadcells::LoadcellGateway;
pub use locks::{BusLockGateway, LockReply};
