//! Storage traits: the abstract interface for space persistence.
//!
//! These traits allow the sync layer to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use std::sync::Arc;

use async_trait::async_trait;
use spacesync_core::{ObjectEntry, ObjectId, Range, SpaceDescriptor, SpaceId};

use crate::error::Result;

/// Result of writing an object entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutResult {
    /// The object was new to the space.
    Inserted,
    /// The object existed with a different hash.
    Updated,
    /// The object existed with the same hash (idempotent - not an error).
    Unchanged,
}

impl PutResult {
    /// Whether the write changed the space state.
    pub fn changed(&self) -> bool {
        !matches!(self, PutResult::Unchanged)
    }
}

/// Persistent state of a single space: its descriptor, object index, and
/// cached whole-space hash.
///
/// # Design Notes
///
/// - **Whole-space hash**: adjusted inside every write that changes the
///   object index by folding the old and new entries into a
///   [`RangeDigest`](spacesync_core::RangeDigest), so a write costs the same
///   however large the space is. [`read_space_hash`](SpaceStorage::read_space_hash)
///   is a single read and always agrees with hashing the whole index.
/// - **Ordering**: [`objects_in`](SpaceStorage::objects_in) returns entries in
///   `(key, id)` order.
#[async_trait]
pub trait SpaceStorage: Send + Sync {
    /// The space this storage holds.
    fn space_id(&self) -> &SpaceId;

    /// The descriptor the space was created from.
    async fn descriptor(&self) -> Result<SpaceDescriptor>;

    /// The cached whole-space hash, hex encoded.
    async fn read_space_hash(&self) -> Result<String>;

    /// All objects whose keys fall in `range`, in key order.
    async fn objects_in(&self, range: Range) -> Result<Vec<ObjectEntry>>;

    /// Look up a single object.
    async fn object(&self, id: &ObjectId) -> Result<Option<ObjectEntry>>;

    /// Insert or update an object entry.
    async fn put_object(&self, entry: &ObjectEntry) -> Result<PutResult>;

    /// Remove an object. Returns whether it existed.
    async fn remove_object(&self, id: &ObjectId) -> Result<bool>;
}

/// Opens and creates [`SpaceStorage`] instances by space id.
#[async_trait]
pub trait SpaceStorageProvider: Send + Sync {
    /// Open the storage of a persisted space.
    ///
    /// Returns `NotFound` if the space has never been persisted.
    async fn space_storage(&self, id: &SpaceId) -> Result<Arc<dyn SpaceStorage>>;

    /// Persist a new space from its descriptor.
    ///
    /// Returns `AlreadyExists` if the space is already persisted.
    async fn create_space_storage(
        &self,
        descriptor: &SpaceDescriptor,
    ) -> Result<Arc<dyn SpaceStorage>>;

    /// Whether a space is persisted.
    async fn space_exists(&self, id: &SpaceId) -> Result<bool>;

    /// Ids of all persisted spaces.
    async fn list_spaces(&self) -> Result<Vec<SpaceId>>;
}

/// Extension trait for common storage patterns.
pub trait SpaceStorageExt: SpaceStorage {
    /// Write many entries, returning how many changed the index.
    fn put_objects(
        &self,
        entries: &[ObjectEntry],
    ) -> impl std::future::Future<Output = Result<usize>> + Send;
}

impl<S: SpaceStorage + ?Sized> SpaceStorageExt for S {
    async fn put_objects(&self, entries: &[ObjectEntry]) -> Result<usize> {
        let mut changed = 0;
        for entry in entries {
            if self.put_object(entry).await?.changed() {
                changed += 1;
            }
        }
        Ok(changed)
    }
}
