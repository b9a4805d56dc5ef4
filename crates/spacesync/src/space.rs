//! The in-process handle of a space.
//!
//! A [`Space`] wraps the space's storage and keeps one outbox of pending
//! changes per connected peer. A change ingested from one peer is queued for
//! every other known peer; the stream worker of each peer drains its outbox
//! after every frame it processes.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use spacesync_core::{
    Blake3Hash, ObjectEntry, ObjectSet, PeerId, Range, RangeHasher, SpaceDescriptor, SpaceId,
};
use spacesync_store::{PutResult, SpaceStorage};
use spacesync_sync::{ObjectChange, ObjectSyncHandler};

use crate::error::Result;

/// Shared handle to one space. One instance per space per registry.
pub struct Space {
    id: SpaceId,
    storage: Arc<dyn SpaceStorage>,
    outboxes: Mutex<HashMap<PeerId, VecDeque<Bytes>>>,
    max_pending: usize,
}

impl Space {
    pub(crate) fn new(storage: Arc<dyn SpaceStorage>, max_pending: usize) -> Self {
        Self {
            id: storage.space_id().clone(),
            storage,
            outboxes: Mutex::new(HashMap::new()),
            max_pending,
        }
    }

    pub fn id(&self) -> &SpaceId {
        &self.id
    }

    pub fn storage(&self) -> &Arc<dyn SpaceStorage> {
        &self.storage
    }

    /// The descriptor the space was created from.
    pub async fn describe(&self) -> Result<SpaceDescriptor> {
        Ok(self.storage.descriptor().await?)
    }

    /// The cached whole-space hash.
    pub async fn current_whole_hash(&self) -> Result<Blake3Hash> {
        let hex = self.storage.read_space_hash().await?;
        Ok(Blake3Hash::from_hex(&hex)?)
    }

    /// Hash of the objects in `range`, computed from the index.
    pub async fn range_hash(&self, range: Range) -> Result<Blake3Hash> {
        let set = ObjectSet::from_entries(self.storage.objects_in(range).await?);
        Ok(RangeHasher::hash(set.entries()))
    }

    pub async fn objects_in(&self, range: Range) -> Result<Vec<ObjectEntry>> {
        Ok(self.storage.objects_in(range).await?)
    }

    /// Start tracking a peer so it receives changes from others.
    pub async fn register_peer(&self, peer: PeerId) {
        self.outboxes.lock().await.entry(peer).or_default();
    }

    /// Stop tracking a peer and drop its pending changes.
    pub async fn forget_peer(&self, peer: &PeerId) {
        self.outboxes.lock().await.remove(peer);
    }

    pub async fn known_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.outboxes.lock().await.keys().copied().collect();
        peers.sort();
        peers
    }

    /// Apply a change payload received from `peer`.
    ///
    /// Changes that alter the index are queued for every other known peer.
    pub async fn ingest_change(&self, peer: &PeerId, payload: Bytes) -> Result<PutResult> {
        let change = ObjectChange::from_payload(&payload)?;
        let result = self.storage.put_object(&change.entry()).await?;

        let mut outboxes = self.outboxes.lock().await;
        outboxes.entry(*peer).or_default();
        if result.changed() {
            self.enqueue(&mut outboxes, Some(peer), &payload);
        }
        Ok(result)
    }

    /// Apply a change made locally and queue it for every known peer.
    pub async fn apply_local_change(&self, change: &ObjectChange) -> Result<PutResult> {
        let payload = change.to_payload()?;
        let result = self.storage.put_object(&change.entry()).await?;
        if result.changed() {
            let mut outboxes = self.outboxes.lock().await;
            self.enqueue(&mut outboxes, None, &payload);
        }
        Ok(result)
    }

    /// Drain the changes queued for `peer`, oldest first.
    pub async fn pending_changes_for(&self, peer: &PeerId) -> Vec<Bytes> {
        let mut outboxes = self.outboxes.lock().await;
        outboxes.entry(*peer).or_default().drain(..).collect()
    }

    fn enqueue(
        &self,
        outboxes: &mut HashMap<PeerId, VecDeque<Bytes>>,
        skip: Option<&PeerId>,
        payload: &Bytes,
    ) {
        for (peer, queue) in outboxes.iter_mut() {
            if Some(peer) == skip {
                continue;
            }
            if queue.len() >= self.max_pending {
                // Head sync recovers whatever is dropped here.
                queue.pop_front();
                tracing::warn!(space_id = %self.id, %peer, "outbox full, dropped oldest change");
            }
            queue.push_back(payload.clone());
        }
    }
}

#[async_trait]
impl ObjectSyncHandler for Space {
    async fn ingest_change(&self, peer: &PeerId, payload: Bytes) -> spacesync_sync::Result<()> {
        Space::ingest_change(self, peer, payload)
            .await
            .map(|_| ())
            .map_err(|e| e.into_sync())
    }

    async fn pending_changes_for(&self, peer: &PeerId) -> spacesync_sync::Result<Vec<Bytes>> {
        Ok(Space::pending_changes_for(self, peer).await)
    }
}

impl std::fmt::Debug for Space {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Space").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacesync_core::SpaceHeader;
    use spacesync_store::{MemoryStorageProvider, SpaceStorageProvider};

    async fn space(max_pending: usize) -> Space {
        let provider = MemoryStorageProvider::new();
        let descriptor = SpaceDescriptor::new(
            SpaceHeader {
                space_id: SpaceId::from("s1"),
                space_type: "test".into(),
                created_at: 0,
                origin: Bytes::new(),
            },
            Bytes::from_static(b"acl"),
            Bytes::from_static(b"settings"),
        );
        let storage = provider.create_space_storage(&descriptor).await.unwrap();
        Space::new(storage, max_pending)
    }

    fn change(id: &str, version: &str) -> ObjectChange {
        ObjectChange::new(id, Blake3Hash::hash(version.as_bytes()), version.as_bytes().to_vec())
    }

    fn peer(b: u8) -> PeerId {
        PeerId::from_bytes([b; 32])
    }

    #[tokio::test]
    async fn test_ingest_fans_out_to_other_peers() {
        let space = space(16).await;
        space.register_peer(peer(2)).await;
        space.register_peer(peer(3)).await;

        let payload = change("doc", "v1").to_payload().unwrap();
        assert_eq!(
            space.ingest_change(&peer(1), payload.clone()).await.unwrap(),
            PutResult::Inserted
        );

        assert!(space.pending_changes_for(&peer(1)).await.is_empty());
        assert_eq!(space.pending_changes_for(&peer(2)).await, vec![payload.clone()]);
        assert_eq!(space.pending_changes_for(&peer(3)).await, vec![payload]);
        assert!(space.pending_changes_for(&peer(2)).await.is_empty());
        assert_eq!(space.known_peers().await, vec![peer(1), peer(2), peer(3)]);
    }

    #[tokio::test]
    async fn test_unchanged_ingest_is_not_forwarded() {
        let space = space(16).await;
        space.register_peer(peer(2)).await;
        let payload = change("doc", "v1").to_payload().unwrap();

        space.ingest_change(&peer(1), payload.clone()).await.unwrap();
        space.pending_changes_for(&peer(2)).await;
        assert_eq!(
            space.ingest_change(&peer(1), payload).await.unwrap(),
            PutResult::Unchanged
        );
        assert!(space.pending_changes_for(&peer(2)).await.is_empty());
    }

    #[tokio::test]
    async fn test_local_change_reaches_every_peer() {
        let space = space(16).await;
        space.register_peer(peer(1)).await;
        space.register_peer(peer(2)).await;

        space.apply_local_change(&change("doc", "v1")).await.unwrap();
        assert_eq!(space.pending_changes_for(&peer(1)).await.len(), 1);
        assert_eq!(space.pending_changes_for(&peer(2)).await.len(), 1);

        let whole = space.current_whole_hash().await.unwrap();
        assert_eq!(whole, space.range_hash(Range::WHOLE).await.unwrap());
        assert_eq!(space.objects_in(Range::WHOLE).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_outbox_drops_oldest() {
        let space = space(2).await;
        space.register_peer(peer(2)).await;
        for v in ["v1", "v2", "v3"] {
            space.apply_local_change(&change("doc", v)).await.unwrap();
        }
        let pending = space.pending_changes_for(&peer(2)).await;
        assert_eq!(pending.len(), 2);
        assert_eq!(ObjectChange::from_payload(&pending[0]).unwrap(), change("doc", "v2"));
    }

    #[tokio::test]
    async fn test_garbage_payload_rejected() {
        let space = space(16).await;
        let err = space
            .ingest_change(&peer(1), Bytes::from_static(b"\xff"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), spacesync_core::ErrorKind::Malformed);
    }

    #[tokio::test]
    async fn test_forget_peer() {
        let space = space(16).await;
        space.register_peer(peer(1)).await;
        space.forget_peer(&peer(1)).await;
        assert!(space.known_peers().await.is_empty());
    }
}
