//! Errors for bus request/reply exchanges.

use crate::events::BusFault;
use thiserror::Error;

/// Failure of a correlated request over the bus.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// No reply arrived within the deadline.
    #[error("Request '{method}' timed out after {timeout_ms} ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// The pending entry was cancelled or its sender dropped.
    #[error("Request '{method}' was dropped before a reply arrived")]
    Dropped { method: String },

    /// Nobody is subscribed to the request topic.
    #[error("No subscriber for topic {topic}")]
    NoReceivers { topic: String },

    /// The responder answered with an error payload.
    #[error("Remote fault {}: {}", .0.code, .0.message)]
    Fault(BusFault),
}

/// Result type for bus exchanges.
pub type BusResult<T> = Result<T, BusError>;
