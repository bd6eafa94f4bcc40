//! Error types for the lock control subsystem.

use shared_types::lock::LockProtocol;
use thiserror::Error;

/// Lock control errors.
///
/// Hardware answering "unsuccessful" is not an error: it decodes to a
/// `LockStatusResult` with `is_success == false`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockControlError {
    /// Discovery found no port speaking the requested protocol.
    #[error("No serial port discovered for protocol {protocol}")]
    NoPortForProtocol { protocol: LockProtocol },

    /// The port bound to the protocol is not (or no longer) open.
    #[error("Serial port {path} is not open")]
    PortNotOpen { path: String },

    /// I/O failure on the serial line.
    #[error("Serial transport error on {path}: {reason}")]
    Transport { path: String, reason: String },

    /// An operation exceeded its deadline.
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The request cannot be expressed on the wire.
    #[error("Invalid lock request: {reason}")]
    InvalidRequest { reason: String },
}

impl LockControlError {
    pub(crate) fn transport(path: &str, reason: impl ToString) -> Self {
        Self::Transport {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoPortForProtocol { .. } => "no_port",
            Self::PortNotOpen { .. } => "port_not_open",
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::InvalidRequest { .. } => "invalid_request",
        }
    }
}

/// Result type for lock control operations.
pub type LockControlResult<T> = Result<T, LockControlError>;
