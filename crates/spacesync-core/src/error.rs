//! Error types for the space sync core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error category shared by every layer of the workspace.
///
/// Each crate's error type maps onto one of these via `kind()`. The facade
/// uses the category, never the detail, when deciding what crosses the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The space (or object) is unknown locally.
    NotFound,
    /// Storage or I/O hiccup; safe to retry.
    Transient,
    /// Duplicate registration of a (peer, space) stream.
    Conflict,
    /// A hash, payload, or descriptor failed to decode or validate.
    Malformed,
    /// Anything else.
    Unexpected,
}

/// Core errors that can occur while decoding or validating sync data.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
}

impl CoreError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::EncodingError(_) => ErrorKind::Unexpected,
            CoreError::DecodingError(_)
            | CoreError::InvalidHash(_)
            | CoreError::InvalidDescriptor(_) => ErrorKind::Malformed,
        }
    }
}
