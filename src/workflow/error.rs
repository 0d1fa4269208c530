use thiserror::Error;

use crate::domain::{RfpStatus, UnknownStatus};
use crate::store::StoreError;

/// Failures surfaced by the workflow engine. Any of these aborts the
/// enclosing transaction.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: RfpStatus, to: RfpStatus },

    /// Optimistic status check lost a race; the caller may retry.
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<UnknownStatus> for WorkflowError {
    fn from(e: UnknownStatus) -> Self {
        Self::Validation(e.to_string())
    }
}
