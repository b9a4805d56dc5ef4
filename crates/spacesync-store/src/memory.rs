//! In-memory implementation of the storage traits.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence. Read counters and
//! fault switches let tests observe which storage paths a request touched.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use spacesync_core::{Blake3Hash, ObjectEntry, ObjectId, Range, RangeDigest, SpaceDescriptor, SpaceId};

use crate::error::{Result, StoreError};
use crate::traits::{PutResult, SpaceStorage, SpaceStorageProvider};

/// In-memory space storage provider.
///
/// All data is lost when the provider is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStorageProvider {
    spaces: RwLock<HashMap<SpaceId, Arc<MemorySpaceStorage>>>,
    opens: AtomicU64,
    creates: AtomicU64,
    fail_opens: AtomicBool,
}

impl MemoryStorageProvider {
    /// Create a new empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete handle to a space's storage, for test setup and inspection.
    pub fn memory_storage(&self, id: &SpaceId) -> Option<Arc<MemorySpaceStorage>> {
        self.spaces.read().unwrap().get(id).cloned()
    }

    /// Number of successful `space_storage` opens.
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of spaces created through `create_space_storage`.
    pub fn creates(&self) -> u64 {
        self.creates.load(Ordering::SeqCst)
    }

    /// Make every `space_storage` call fail with `Unavailable`.
    pub fn set_fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SpaceStorageProvider for MemoryStorageProvider {
    async fn space_storage(&self, id: &SpaceId) -> Result<Arc<dyn SpaceStorage>> {
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("open of {} refused", id)));
        }
        let storage = self
            .spaces
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(storage)
    }

    async fn create_space_storage(
        &self,
        descriptor: &SpaceDescriptor,
    ) -> Result<Arc<dyn SpaceStorage>> {
        let mut spaces = self.spaces.write().unwrap();
        let id = descriptor.space_id().clone();
        if spaces.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        let storage = Arc::new(MemorySpaceStorage::new(descriptor.clone()));
        spaces.insert(id, Arc::clone(&storage));
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(storage)
    }

    async fn space_exists(&self, id: &SpaceId) -> Result<bool> {
        Ok(self.spaces.read().unwrap().contains_key(id))
    }

    async fn list_spaces(&self) -> Result<Vec<SpaceId>> {
        let mut ids: Vec<SpaceId> = self.spaces.read().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// In-memory storage of a single space.
pub struct MemorySpaceStorage {
    space_id: SpaceId,
    inner: RwLock<MemorySpaceInner>,
    index_reads: AtomicU64,
    hash_reads: AtomicU64,
    fail_index_reads: AtomicBool,
    fail_hash_reads: AtomicBool,
}

struct MemorySpaceInner {
    descriptor: SpaceDescriptor,

    /// Object index ordered by `(key, id)`.
    objects: BTreeMap<(u64, ObjectId), Blake3Hash>,

    /// Running digest of every object, adjusted on each write.
    digest: RangeDigest,

    /// Cached whole-space hash, hex encoded.
    space_hash: String,
}

impl MemorySpaceInner {
    fn publish_digest(&mut self) {
        self.space_hash = self.digest.finish().to_hex();
    }
}

impl MemorySpaceStorage {
    fn new(descriptor: SpaceDescriptor) -> Self {
        Self {
            space_id: descriptor.space_id().clone(),
            inner: RwLock::new(MemorySpaceInner {
                descriptor,
                objects: BTreeMap::new(),
                digest: RangeDigest::new(),
                space_hash: RangeDigest::new().finish().to_hex(),
            }),
            index_reads: AtomicU64::new(0),
            hash_reads: AtomicU64::new(0),
            fail_index_reads: AtomicBool::new(false),
            fail_hash_reads: AtomicBool::new(false),
        }
    }

    /// Number of reads that touched the object index.
    pub fn index_reads(&self) -> u64 {
        self.index_reads.load(Ordering::SeqCst)
    }

    /// Number of cached whole-space hash reads.
    pub fn hash_reads(&self) -> u64 {
        self.hash_reads.load(Ordering::SeqCst)
    }

    /// Make index reads fail with `Unavailable`.
    pub fn set_fail_index_reads(&self, fail: bool) {
        self.fail_index_reads.store(fail, Ordering::SeqCst);
    }

    /// Make cached hash reads fail with `Unavailable`.
    pub fn set_fail_hash_reads(&self, fail: bool) {
        self.fail_hash_reads.store(fail, Ordering::SeqCst);
    }

    /// Replace the cached hash with arbitrary text, simulating corruption.
    pub fn overwrite_space_hash(&self, raw: &str) {
        self.inner.write().unwrap().space_hash = raw.to_owned();
    }
}

#[async_trait]
impl SpaceStorage for MemorySpaceStorage {
    fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    async fn descriptor(&self) -> Result<SpaceDescriptor> {
        Ok(self.inner.read().unwrap().descriptor.clone())
    }

    async fn read_space_hash(&self) -> Result<String> {
        if self.fail_hash_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("space hash read refused".into()));
        }
        self.hash_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.read().unwrap().space_hash.clone())
    }

    async fn objects_in(&self, range: Range) -> Result<Vec<ObjectEntry>> {
        if self.fail_index_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("object index read refused".into()));
        }
        self.index_reads.fetch_add(1, Ordering::SeqCst);
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let inner = self.inner.read().unwrap();
        let lower = (range.from, ObjectId::new(""));
        let upper = (range.to, ObjectId::new(""));
        Ok(inner
            .objects
            .range(lower..upper)
            .map(|((_, id), hash)| ObjectEntry::new(id.clone(), *hash))
            .collect())
    }

    async fn object(&self, id: &ObjectId) -> Result<Option<ObjectEntry>> {
        if self.fail_index_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("object index read refused".into()));
        }
        self.index_reads.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.read().unwrap();
        Ok(inner
            .objects
            .get(&(id.key(), id.clone()))
            .map(|hash| ObjectEntry::new(id.clone(), *hash)))
    }

    async fn put_object(&self, entry: &ObjectEntry) -> Result<PutResult> {
        let mut inner = self.inner.write().unwrap();
        let previous = inner.objects.insert((entry.key(), entry.id.clone()), entry.hash);
        let result = match previous {
            None => {
                inner.digest.add(entry);
                PutResult::Inserted
            }
            Some(previous) if previous == entry.hash => PutResult::Unchanged,
            Some(previous) => {
                inner
                    .digest
                    .replace(&ObjectEntry::new(entry.id.clone(), previous), entry);
                PutResult::Updated
            }
        };
        if result.changed() {
            inner.publish_digest();
        }
        Ok(result)
    }

    async fn remove_object(&self, id: &ObjectId) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        let Some(previous) = inner.objects.remove(&(id.key(), id.clone())) else {
            return Ok(false);
        };
        inner.digest.remove(&ObjectEntry::new(id.clone(), previous));
        inner.publish_digest();
        Ok(true)
    }
}
