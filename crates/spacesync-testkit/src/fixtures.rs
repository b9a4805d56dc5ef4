//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use spacesync_core::{Blake3Hash, ObjectEntry, PeerId, SpaceDescriptor, SpaceHeader, SpaceId};
use spacesync_store::{
    MemorySpaceStorage, MemoryStorageProvider, SpaceStorageExt, SpaceStorageProvider,
};
use spacesync_sync::ObjectChange;

/// A descriptor with fixed payloads for `id`.
pub fn descriptor(id: &str) -> SpaceDescriptor {
    descriptor_with_acl(id, b"acl-v1")
}

/// A descriptor with a chosen ACL payload.
pub fn descriptor_with_acl(id: &str, acl: &[u8]) -> SpaceDescriptor {
    SpaceDescriptor::new(
        SpaceHeader {
            space_id: SpaceId::from(id),
            space_type: "test".into(),
            created_at: 1_700_000_000_000,
            origin: Bytes::from_static(b"testkit"),
        },
        Bytes::copy_from_slice(acl),
        Bytes::from_static(b"settings-v1"),
    )
}

/// Content hash of version `version` of object `id`.
pub fn content_hash(id: &str, version: u32) -> Blake3Hash {
    Blake3Hash::hash(format!("{}@{}", id, version).as_bytes())
}

/// `n` entries named `{prefix}-{i}`, all at `version`.
pub fn entries(prefix: &str, n: usize, version: u32) -> Vec<ObjectEntry> {
    (0..n)
        .map(|i| {
            let id = format!("{}-{}", prefix, i);
            let hash = content_hash(&id, version);
            ObjectEntry::new(id, hash)
        })
        .collect()
}

/// `n` entries with random-looking ids, reproducible from `seed`.
pub fn scattered_entries(seed: u64, n: usize) -> Vec<ObjectEntry> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let id = format!("obj-{:016x}", rng.gen::<u64>());
            let hash = content_hash(&id, 1);
            ObjectEntry::new(id, hash)
        })
        .collect()
}

/// A change carrying version `version` of object `id`.
pub fn change(id: &str, version: u32) -> ObjectChange {
    ObjectChange::new(
        id,
        content_hash(id, version),
        format!("{}@{}", id, version).into_bytes(),
    )
}

/// Deterministic peer ids for multi-peer tests.
pub fn peers(count: usize) -> Vec<PeerId> {
    (0..count)
        .map(|i| {
            let mut bytes = [0u8; 32];
            bytes[0] = i as u8 + 1;
            PeerId::from_bytes(bytes)
        })
        .collect()
}

/// Two in-memory providers holding replicas of the same space.
pub struct ReplicaPair {
    pub space_id: SpaceId,
    pub local: Arc<MemoryStorageProvider>,
    pub remote: Arc<MemoryStorageProvider>,
}

impl ReplicaPair {
    /// Create the space on both sides, each seeded with its own entries.
    pub async fn new(id: &str, local: &[ObjectEntry], remote: &[ObjectEntry]) -> Self {
        let pair = Self {
            space_id: SpaceId::from(id),
            local: Arc::new(MemoryStorageProvider::new()),
            remote: Arc::new(MemoryStorageProvider::new()),
        };
        for (provider, seed) in [(&pair.local, local), (&pair.remote, remote)] {
            let storage = provider
                .create_space_storage(&descriptor(id))
                .await
                .expect("create replica");
            storage.put_objects(seed).await.expect("seed replica");
        }
        pair
    }

    pub fn local_storage(&self) -> Arc<MemorySpaceStorage> {
        self.local
            .memory_storage(&self.space_id)
            .expect("local replica exists")
    }

    pub fn remote_storage(&self) -> Arc<MemorySpaceStorage> {
        self.remote
            .memory_storage(&self.space_id)
            .expect("remote replica exists")
    }
}
