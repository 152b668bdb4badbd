use std::fmt;

use crate::statement::StatementKind;

/// The single normalized failure kind reported by storage backends.
///
/// Adapters translate their driver-specific errors into this type before
/// anything reaches the persistence core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Transport or driver failure reported by the storage technology.
    #[error("{backend} driver failure: {message}")]
    Driver { backend: String, message: String },

    /// The statement is missing keys or parameters required by its kind.
    #[error("malformed {kind} statement: {reason}")]
    MalformedStatement { kind: StatementKind, reason: String },

    /// Invalid backend configuration.
    #[error("invalid backend configuration: {0}")]
    InvalidConfig(String),

    /// An asynchronous backend task panicked or was cancelled.
    #[error("backend task failed: {0}")]
    Task(String),
}

impl BackendError {
    /// Normalize a driver error from the named backend.
    pub fn driver(backend: &str, err: impl fmt::Display) -> Self {
        Self::Driver {
            backend: backend.to_string(),
            message: err.to_string(),
        }
    }
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
