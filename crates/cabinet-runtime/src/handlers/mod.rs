//! # Event Handlers
//!
//! One handler per bus concern. Each subscribes when constructed so nothing
//! published after startup is missed, then loops in `run()` until the
//! runtime cancels it.

pub mod bin_state;
pub mod lock_requests;
pub mod lock_tracking;
pub mod transactions;
pub mod weights;

pub use bin_state::BinStateHandler;
pub use lock_requests::{fault_for, LockReplyHandler, LockRequestHandler};
pub use lock_tracking::TrackingRequestHandler;
pub use transactions::TransactionSignalHandler;
pub use weights::WeightHandler;

use cabinet_telemetry::EVENT_BUS_MESSAGES;
use shared_bus::CabinetEvent;

pub(crate) fn record_received(event: &CabinetEvent) {
    EVENT_BUS_MESSAGES
        .with_label_values(&[event.topic().as_str(), "received"])
        .inc();
}
