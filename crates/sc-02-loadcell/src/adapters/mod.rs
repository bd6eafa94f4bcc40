//! Adapters for the loadcell ports.

pub mod memory;

pub use memory::{InMemoryBinStates, InMemoryLoadcellStore, RecordingQuantityPublisher};
