//! Errors raised while reconciling or streaming a space.

use spacesync_core::{CoreError, ErrorKind, PeerId, SpaceId};
use thiserror::Error;

use crate::messages::SyncErrorCode;

#[derive(Debug, Error)]
pub enum SyncError {
    /// A frame or request broke the wire limits.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("codec error: {0}")]
    Codec(#[from] CoreError),

    /// The stream transport failed underneath a worker.
    #[error("transport error: {0}")]
    TransportError(String),

    #[error("store error: {0}")]
    StoreError(#[from] spacesync_store::StoreError),

    /// A worker is already active for this (peer, space) pair.
    #[error("stream already active for peer {peer} in space {space_id}")]
    StreamConflict { peer: PeerId, space_id: SpaceId },

    /// The remote side answered a request with an error code.
    #[error("peer error ({code:?}): {message}")]
    PeerError { code: SyncErrorCode, message: String },

    /// Change ingestion rejected a payload.
    #[error("handler error: {0}")]
    Handler(String),

    /// Reconciliation did not converge within the round budget.
    #[error("reconciliation exceeded {0} rounds")]
    RoundLimit(usize),

    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::InvalidMessage(_) => ErrorKind::Malformed,
            SyncError::Codec(e) => e.kind(),
            SyncError::TransportError(_) => ErrorKind::Transient,
            SyncError::StoreError(e) => e.kind(),
            SyncError::StreamConflict { .. } => ErrorKind::Conflict,
            SyncError::PeerError { code, .. } => match code {
                SyncErrorCode::SpaceMissing => ErrorKind::NotFound,
                SyncErrorCode::StreamConflict => ErrorKind::Conflict,
                SyncErrorCode::Unexpected => ErrorKind::Unexpected,
            },
            SyncError::Handler(_) | SyncError::RoundLimit(_) | SyncError::Cancelled => {
                ErrorKind::Unexpected
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
