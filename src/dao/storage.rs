//! Failure type shared by every session-store backend.

use std::error::Error;
use thiserror::Error;

/// Result alias for session-store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// A session-store call that could not be served.
///
/// Backends collapse their driver-specific failures into this one shape; the
/// failing operation names the call for the log line and the driver error
/// rides along as the source.
#[derive(Debug, Error)]
#[error("session store unavailable: {operation}")]
pub struct StorageError {
    operation: String,
    #[source]
    source: Box<dyn Error + Send + Sync>,
}

impl StorageError {
    /// Wrap a backend failure, tagged with the operation that hit it.
    pub fn unavailable(
        operation: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            operation: operation.into(),
            source: Box::new(source),
        }
    }
}
