//! Ports for the loadcell subsystem.

pub mod inbound;
pub mod outbound;

pub use inbound::LoadcellApi;
pub use outbound::{BinStateProvider, LoadcellStore, QuantityPublisher};
