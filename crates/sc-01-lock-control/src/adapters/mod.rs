//! Adapters for the lock control ports.

pub mod serial;
pub mod simulated;

pub use serial::TokioSerialTransport;
pub use simulated::{InMemorySerialTransport, SimulatedBoard, SimulatedCuBoard, SimulatedScuBoard};
