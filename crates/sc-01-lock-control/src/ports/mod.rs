//! Ports for the lock control subsystem.

pub mod inbound;
pub mod outbound;

pub use inbound::{DiscoveryReport, LockControlApi};
pub use outbound::{SerialTransport, TrackingSink};
