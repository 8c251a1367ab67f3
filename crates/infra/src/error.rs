//! Caller-facing error taxonomy for the procurement services.

use thiserror::Error;

use procura_core::{DomainError, ItemId};

use crate::store::StoreError;

pub type ProcurementResult<T> = Result<T, ProcurementError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcurementError {
    /// Malformed input; the caller fixes it and resubmits.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The request already left `pending`. Expected when two approvers race.
    #[error("request already processed (status: {status})")]
    AlreadyProcessed { status: String },

    #[error(
        "insufficient stock for {item_name}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        item_id: ItemId,
        item_name: String,
        available: i64,
        requested: u32,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    /// A domain invariant failed; indicates a bug rather than bad input.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Storage failed and the operation was rolled back; safe to retry.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProcurementError {
    pub fn not_found(entity: &str, id: impl core::fmt::Display) -> Self {
        Self::NotFound(format!("{entity} {id}"))
    }

    /// Whether retrying the identical call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcurementError::Store(_))
    }
}

impl From<DomainError> for ProcurementError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::NotFound(what) => Self::NotFound(what),
            DomainError::AlreadyProcessed { status } => Self::AlreadyProcessed { status },
            DomainError::InsufficientStock {
                item_id,
                available,
                requested,
            } => Self::InsufficientStock {
                item_id,
                item_name: item_id.to_string(),
                available,
                requested,
            },
            DomainError::Conflict(msg) => Self::Conflict(msg),
            DomainError::InvariantViolation(msg) => Self::Invariant(msg),
        }
    }
}
