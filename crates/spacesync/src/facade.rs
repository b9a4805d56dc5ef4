//! The facade: the four space sync operations over one registry.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use spacesync_core::{validate_descriptor, PeerId, SpaceDescriptor, SpaceId};
use spacesync_store::SpaceStorageProvider;
use spacesync_sync::{
    diff_with_peer, duplex, DiffReport, FastPathResolver, HeadSyncClient, HeadSyncEngine,
    HeadSyncRequest, HeadSyncResponse, MemoryObjectStream, ObjectStream, ObjectSyncHandler,
    ObjectSyncMessage, StreamContext, StreamRouter, SyncError, WorkerExit,
};

use crate::config::SpaceSyncConfig;
use crate::error::{Result, RpcError, RpcResult, SpaceSyncError};
use crate::identity::{ContextIdentity, PeerIdentityResolver};
use crate::registry::SpaceRegistry;
use crate::space::Space;

/// Entry point for remote peers.
///
/// Every call runs independently; the registry is the only state shared
/// between calls. Internal errors are logged here and collapsed to
/// [`RpcError`] before they are returned.
pub struct SpaceSyncFacade {
    registry: Arc<SpaceRegistry>,
    fast_path: FastPathResolver,
    engine: HeadSyncEngine,
    router: StreamRouter,
    identity: Arc<dyn PeerIdentityResolver>,
    config: SpaceSyncConfig,
}

impl SpaceSyncFacade {
    /// Create a facade over a storage provider. Fails if `config` does not
    /// pass [`SpaceSyncConfig::validate`].
    pub fn new(provider: Arc<dyn SpaceStorageProvider>, config: SpaceSyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: Arc::new(SpaceRegistry::new(
                Arc::clone(&provider),
                config.max_pending_per_peer,
            )),
            fast_path: FastPathResolver::new(provider),
            engine: HeadSyncEngine::new(config.head_sync.clone()),
            router: StreamRouter::new(config.stream.clone()),
            identity: Arc::new(ContextIdentity),
            config,
        })
    }

    /// Replace how stream peers are identified.
    pub fn with_identity_resolver(mut self, identity: Arc<dyn PeerIdentityResolver>) -> Self {
        self.identity = identity;
        self
    }

    pub fn registry(&self) -> &Arc<SpaceRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &StreamRouter {
        &self.router
    }

    pub fn config(&self) -> &SpaceSyncConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Remote Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Return the descriptor of a space known locally.
    pub async fn pull(
        &self,
        space_id: &SpaceId,
        cancel: &CancellationToken,
    ) -> RpcResult<SpaceDescriptor> {
        self.pull_inner(space_id, cancel)
            .await
            .map_err(|e| collapse("pull", space_id, e))
    }

    /// Accept a descriptor from a peer, creating the space if it is unknown.
    ///
    /// Pushing a space that already exists is acknowledged without touching
    /// the stored descriptor.
    pub async fn push(
        &self,
        descriptor: SpaceDescriptor,
        cancel: &CancellationToken,
    ) -> RpcResult<()> {
        let space_id = descriptor.space_id().clone();
        self.push_inner(&descriptor, cancel)
            .await
            .map_err(|e| collapse("push", &space_id, e))
    }

    /// Compare range hashes against the local replica.
    pub async fn head_sync(
        &self,
        request: HeadSyncRequest,
        cancel: &CancellationToken,
    ) -> RpcResult<HeadSyncResponse> {
        self.head_sync_inner(&request, cancel)
            .await
            .map_err(|e| collapse("head_sync", &request.space_id, e))
    }

    /// Serve an object sync stream until it ends.
    ///
    /// The first frame names the space. The stream is handed to a worker only
    /// once the frame, the peer identity, and the space all check out.
    pub async fn object_sync_stream<S: ObjectStream>(
        &self,
        mut stream: S,
        cancel: &CancellationToken,
    ) -> RpcResult<WorkerExit> {
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            frame = stream.recv() => Some(frame),
        };
        let first = match first {
            None => return Err(reject_stream(SpaceSyncError::Cancelled)),
            Some(Err(e)) => return Err(reject_stream(e.into())),
            Some(Ok(None)) => return Err(reject_stream(SpaceSyncError::StreamClosed)),
            Some(Ok(Some(frame))) => frame,
        };
        let space_id = first.space_id.clone();
        let context = stream.context().clone();

        let (peer, space) = match self.admit(&first, &context, cancel).await {
            Ok(admitted) => admitted,
            Err(e) => return Err(collapse("object_sync_stream", &space_id, e)),
        };

        let handler: Arc<dyn ObjectSyncHandler> = space.clone();
        let handle = match self.router.route(peer, first, stream, handler) {
            Ok(handle) => handle,
            Err(e) => return Err(collapse("object_sync_stream", &space_id, e.into())),
        };

        let wait = handle.wait();
        tokio::pin!(wait);
        let finished = tokio::select! {
            biased;
            exit = &mut wait => Some(exit),
            _ = cancel.cancelled() => None,
        };
        let exit = match finished {
            Some(exit) => exit,
            None => {
                self.router.close_pair(&peer, &space_id);
                wait.await
            }
        };

        if !self.router.is_active(&peer, &space_id) {
            space.forget_peer(&peer).await;
        }
        exit.map_err(|e| collapse("object_sync_stream", &space_id, e.into()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// A connected in-memory stream pair sized by the stream config.
    ///
    /// The server end reports `context` as its remote peer.
    pub fn memory_stream(&self, context: StreamContext) -> (MemoryObjectStream, MemoryObjectStream) {
        duplex(self.config.stream.channel_capacity, context)
    }

    /// Resolve the handle of a space known locally.
    pub async fn space(&self, space_id: &SpaceId, cancel: &CancellationToken) -> Result<Arc<Space>> {
        self.registry.resolve(space_id, None, cancel).await
    }

    /// Reconcile a local space against a peer.
    pub async fn diff_space<C>(
        &self,
        space_id: &SpaceId,
        peer: &C,
        cancel: &CancellationToken,
    ) -> Result<DiffReport>
    where
        C: HeadSyncClient + ?Sized,
    {
        let space = self.registry.resolve(space_id, None, cancel).await?;
        let report = diff_with_peer(
            space_id,
            space.storage().as_ref(),
            peer,
            &self.config.head_sync,
            cancel,
        )
        .await?;
        tracing::debug!(
            %space_id,
            new = report.new_ids.len(),
            changed = report.changed_ids.len(),
            removed = report.removed_ids.len(),
            rounds = report.rounds,
            "reconciled with peer"
        );
        Ok(report)
    }

    /// Stop the streams of a space and drop its handle.
    ///
    /// Storage is kept; the next resolution loads the space again.
    pub fn close_space(&self, space_id: &SpaceId) -> usize {
        let closed = self.router.close_space(space_id);
        self.registry.remove(space_id);
        tracing::debug!(%space_id, closed, "space closed");
        closed
    }

    /// Stop every stream worker.
    pub fn shutdown(&self) {
        self.router.shutdown();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal
    // ─────────────────────────────────────────────────────────────────────────

    async fn pull_inner(
        &self,
        space_id: &SpaceId,
        cancel: &CancellationToken,
    ) -> Result<SpaceDescriptor> {
        let space = self.registry.resolve(space_id, None, cancel).await?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SpaceSyncError::Cancelled),
            descriptor = space.describe() => descriptor,
        }
    }

    async fn push_inner(
        &self,
        descriptor: &SpaceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<()> {
        validate_descriptor(descriptor)?;
        self.registry
            .resolve(descriptor.space_id(), Some(descriptor), cancel)
            .await?;
        Ok(())
    }

    async fn head_sync_inner(
        &self,
        request: &HeadSyncRequest,
        cancel: &CancellationToken,
    ) -> Result<HeadSyncResponse> {
        if let Some(response) = self.fast_path.try_resolve(request, cancel).await {
            return Ok(response);
        }
        let space = self.registry.resolve(&request.space_id, None, cancel).await?;
        Ok(self
            .engine
            .head_sync(space.storage().as_ref(), request, cancel)
            .await?)
    }

    async fn admit(
        &self,
        first: &ObjectSyncMessage,
        context: &StreamContext,
        cancel: &CancellationToken,
    ) -> Result<(PeerId, Arc<Space>)> {
        first
            .validate_limits()
            .map_err(|e| SyncError::InvalidMessage(e.into()))?;
        let peer = self.identity.identity_of(context)?;
        let space = self.registry.resolve(&first.space_id, None, cancel).await?;
        space.register_peer(peer).await;
        Ok((peer, space))
    }
}

fn collapse(op: &'static str, space_id: &SpaceId, err: SpaceSyncError) -> RpcError {
    let rpc = RpcError::collapse(&err);
    tracing::warn!(op, %space_id, error = %err, ?rpc, "request failed");
    rpc
}

/// For streams that fail before the space is known.
fn reject_stream(err: SpaceSyncError) -> RpcError {
    let rpc = RpcError::collapse(&err);
    tracing::warn!(op = "object_sync_stream", error = %err, ?rpc, "stream rejected");
    rpc
}

#[async_trait]
impl HeadSyncClient for SpaceSyncFacade {
    async fn head_sync(&self, request: HeadSyncRequest) -> spacesync_sync::Result<HeadSyncResponse> {
        SpaceSyncFacade::head_sync(self, request, &CancellationToken::new())
            .await
            .map_err(|e| SyncError::PeerError {
                code: e.code(),
                message: e.to_string(),
            })
    }
}
