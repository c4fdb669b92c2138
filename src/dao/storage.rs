use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A document read by the transaction changed before the commit landed.
    #[error("transaction conflict on `{key}`")]
    Conflict { key: String },
    /// A stored document could not be interpreted as the expected kind.
    #[error("corrupt document `{key}`: {reason}")]
    Corrupt { key: String, reason: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a conflict error for the given document key.
    pub fn conflict(key: impl ToString) -> Self {
        StorageError::Conflict {
            key: key.to_string(),
        }
    }

    /// Whether this error only reports a lost optimistic race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}
