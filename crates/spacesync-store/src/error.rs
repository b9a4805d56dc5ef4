//! Storage errors.

use spacesync_core::{CoreError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored descriptor or hash failed to decode.
    #[error("serialization error: {0}")]
    Serialization(#[from] CoreError),

    /// No storage has been persisted for the space.
    #[error("space not found: {0}")]
    NotFound(String),

    /// Creation raced with, or repeated, an earlier create.
    #[error("space already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The backend refused the read or write for now. Retrying may succeed.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Schema could not be brought to the version this build expects.
    #[error("migration error: {0}")]
    Migration(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::AlreadyExists(_) => ErrorKind::Conflict,
            StoreError::Serialization(_) | StoreError::InvalidData(_) => ErrorKind::Malformed,
            StoreError::Database(_) | StoreError::Unavailable(_) => ErrorKind::Transient,
            StoreError::Migration(_) => ErrorKind::Unexpected,
        }
    }

    /// True when the space has no persisted storage.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
