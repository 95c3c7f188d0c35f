//! Domain-level error type shared by the service layer.
//!
//! Repository failures are wrapped unchanged so callers can still inspect
//! their [`ErrorContext`](crate::db::repository::ErrorContext).

use crate::db::repository::RepositoryError;

/// Result type for domain and service operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Error type for domain operations.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::result_large_err)]
pub enum DomainError {
    /// Input rejected by a domain rule (bad colour, wrong device kind, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested variant exists in the model but is not implemented.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Missing, expired or forged credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Operation collides with existing state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unexpected failure outside the storage layer.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Storage failure, including not-found lookups.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Repository(RepositoryError::not_found(message))
    }

    /// True when the underlying cause is a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Repository(RepositoryError::NotFound { .. }))
    }
}
