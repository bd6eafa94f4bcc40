//! # Error Types
//!
//! Errors reported by persistence collaborators. Each subsystem wraps these
//! into its own error enum.

use thiserror::Error;

/// Errors surfaced by store adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A write conflicted with a concurrent update.
    #[error("Write conflict on {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    /// Backend failure.
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
