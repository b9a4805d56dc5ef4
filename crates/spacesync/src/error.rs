//! Error types for the facade.

use spacesync_core::{CoreError, ErrorKind, SpaceId};
use spacesync_store::StoreError;
use spacesync_sync::{SyncError, SyncErrorCode};
use thiserror::Error;

/// Errors that can occur inside facade operations.
///
/// These stay in the process. What crosses the wire is [`RpcError`].
#[derive(Debug, Error)]
pub enum SpaceSyncError {
    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Encoding or validation error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Space is not known locally.
    #[error("space missing: {0}")]
    SpaceMissing(SpaceId),

    /// A creation hint was supplied for a different space.
    #[error("creation hint for {hint} used to resolve {requested}")]
    HintMismatch { requested: SpaceId, hint: SpaceId },

    /// Peer identity could not be derived from the stream.
    #[error("peer identity unavailable: {0}")]
    Identity(String),

    /// Stream ended before the first frame.
    #[error("stream closed before the first frame")]
    StreamClosed,

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl SpaceSyncError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpaceSyncError::Store(e) => e.kind(),
            SpaceSyncError::Sync(e) => e.kind(),
            SpaceSyncError::Core(e) => e.kind(),
            SpaceSyncError::SpaceMissing(_) => ErrorKind::NotFound,
            SpaceSyncError::HintMismatch { .. } => ErrorKind::Malformed,
            SpaceSyncError::Identity(_)
            | SpaceSyncError::StreamClosed
            | SpaceSyncError::Config(_)
            | SpaceSyncError::Cancelled => ErrorKind::Unexpected,
        }
    }

    /// Whether the error is a duplicate stream registration.
    pub fn is_stream_conflict(&self) -> bool {
        matches!(self, SpaceSyncError::Sync(SyncError::StreamConflict { .. }))
    }

    /// Convert for the stream handler boundary.
    pub(crate) fn into_sync(self) -> SyncError {
        match self {
            SpaceSyncError::Sync(e) => e,
            SpaceSyncError::Store(e) => SyncError::StoreError(e),
            SpaceSyncError::Core(e) => SyncError::Codec(e),
            other => SyncError::Handler(other.to_string()),
        }
    }
}

/// Result type for facade internals.
pub type Result<T> = std::result::Result<T, SpaceSyncError>;

/// The error a remote caller sees.
///
/// Only the category crosses the process boundary; details are logged
/// locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum RpcError {
    /// Space not known locally. Callers respond by pushing the descriptor.
    #[error("space missing")]
    SpaceMissing,

    /// Any other failure.
    #[error("unexpected error")]
    Unexpected,

    /// A stream is already active for this (peer, space) pair.
    #[error("stream conflict")]
    StreamConflict,
}

impl RpcError {
    /// Collapse an internal error to its wire category.
    pub fn collapse(err: &SpaceSyncError) -> Self {
        match err.kind() {
            ErrorKind::NotFound => RpcError::SpaceMissing,
            ErrorKind::Conflict if err.is_stream_conflict() => RpcError::StreamConflict,
            _ => RpcError::Unexpected,
        }
    }

    /// Wire code.
    pub fn code(&self) -> SyncErrorCode {
        match self {
            RpcError::SpaceMissing => SyncErrorCode::SpaceMissing,
            RpcError::Unexpected => SyncErrorCode::Unexpected,
            RpcError::StreamConflict => SyncErrorCode::StreamConflict,
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::SpaceMissing => ErrorKind::NotFound,
            RpcError::Unexpected => ErrorKind::Unexpected,
            RpcError::StreamConflict => ErrorKind::Conflict,
        }
    }
}

impl From<SyncErrorCode> for RpcError {
    fn from(code: SyncErrorCode) -> Self {
        match code {
            SyncErrorCode::SpaceMissing => RpcError::SpaceMissing,
            SyncErrorCode::Unexpected => RpcError::Unexpected,
            SyncErrorCode::StreamConflict => RpcError::StreamConflict,
        }
    }
}

/// Result type for facade operations as seen by remote callers.
pub type RpcResult<T> = std::result::Result<T, RpcError>;
