//! Domain error types.

use store::StoreError;
use thiserror::Error;

/// Errors that can occur during customer operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A required field is missing or empty.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The customer or child value does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The child value is already taken.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The caller's deadline passed before the operation finished.
    #[error("Deadline exceeded during {operation}")]
    Timeout { operation: &'static str },

    /// An unclassified failure in the store.
    #[error("Storage error: {0}")]
    Storage(#[source] StoreError),
}

/// The kind of a [`DomainError`], for callers that map failures onto
/// status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Timeout,
    Storage,
}

impl ErrorKind {
    /// Returns a stable snake_case name, used as a metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Storage => "storage",
        }
    }
}

impl DomainError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) => ErrorKind::Validation,
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::Timeout { .. } => ErrorKind::Timeout,
            DomainError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => DomainError::NotFound(what),
            StoreError::UniqueViolation { constraint } => {
                DomainError::Conflict(format!("value already exists ({constraint})"))
            }
            // The parent disappeared between the existence check and the write.
            StoreError::ForeignKeyViolation { constraint } => {
                DomainError::NotFound(format!("no such customer ({constraint})"))
            }
            StoreError::Timeout => DomainError::Timeout {
                operation: "connection acquisition",
            },
            other => DomainError::Storage(other),
        }
    }
}
