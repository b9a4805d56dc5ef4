//! Peer identity for object streams.

use spacesync_core::PeerId;
use spacesync_sync::StreamContext;

use crate::error::{Result, SpaceSyncError};

/// Derives the remote peer of a stream from its transport context.
pub trait PeerIdentityResolver: Send + Sync {
    fn identity_of(&self, context: &StreamContext) -> Result<PeerId>;
}

/// Trusts the peer the transport authenticated. Anonymous streams are
/// rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextIdentity;

impl PeerIdentityResolver for ContextIdentity {
    fn identity_of(&self, context: &StreamContext) -> Result<PeerId> {
        context
            .peer
            .ok_or_else(|| SpaceSyncError::Identity("stream is not authenticated".into()))
    }
}
