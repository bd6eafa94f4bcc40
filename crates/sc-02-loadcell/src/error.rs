//! Error types for the loadcell subsystem.

use shared_types::entities::LoadCellId;
use shared_types::errors::StoreError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LoadcellError {
    #[error("Load cell not found: {id}")]
    LoadCellNotFound { id: LoadCellId },

    #[error("Invalid calibration: {reason}")]
    InvalidCalibration { reason: String },

    /// Calibration can only move within one port's cluster of sensors.
    #[error("Load cells {from} and {to} are on different ports ({from_port} / {to_port})")]
    PortMismatch {
        from: LoadCellId,
        to: LoadCellId,
        from_port: String,
        to_port: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LoadcellError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LoadCellNotFound { .. } => "not_found",
            Self::InvalidCalibration { .. } => "invalid_calibration",
            Self::PortMismatch { .. } => "port_mismatch",
            Self::Store(_) => "store",
        }
    }
}

pub type LoadcellResult<T> = Result<T, LoadcellError>;
