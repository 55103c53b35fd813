use thiserror::Error;

use stockflow_core::DomainError;

use crate::event_store::EventStoreError;

/// Application-level error.
///
/// Domain errors surface unchanged; store errors are split so callers can
/// tell an optimistic-concurrency loss (retryable) from everything else.
#[derive(Debug, Error)]
pub enum AppError {
    /// Optimistic concurrency failure (stale stream version). Retryable.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Failed to deserialize historical event payloads.
    #[error("event deserialization failed: {0}")]
    Deserialize(String),

    /// Persisting to the event store failed.
    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for AppError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => AppError::Concurrency(msg.clone()),
            _ => AppError::Store(value),
        }
    }
}

impl From<DomainError> for AppError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => AppError::Validation(msg),
            DomainError::InvariantViolation(msg) => AppError::InvariantViolation(msg),
            DomainError::InvalidState(msg) => AppError::InvalidState(msg),
            DomainError::InsufficientStock(msg) => AppError::InsufficientStock(msg),
            DomainError::InvalidId(msg) => AppError::Validation(msg),
            DomainError::NotFound(what) => AppError::NotFound(what),
            DomainError::Conflict(msg) => AppError::Conflict(msg),
        }
    }
}
