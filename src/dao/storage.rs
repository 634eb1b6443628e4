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
    /// A compare-and-swap replace was attempted with a stale revision.
    #[error("revision conflict on room `{room_id}`")]
    Conflict { room_id: String },
    /// The targeted document no longer exists.
    #[error("room `{room_id}` is missing")]
    Missing { room_id: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a conflict error for the given room.
    pub fn conflict(room_id: impl ToString) -> Self {
        StorageError::Conflict {
            room_id: room_id.to_string(),
        }
    }

    /// Construct a missing-document error for the given room.
    pub fn missing(room_id: impl ToString) -> Self {
        StorageError::Missing {
            room_id: room_id.to_string(),
        }
    }
}
