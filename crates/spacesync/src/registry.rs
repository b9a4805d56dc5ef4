//! Process-wide registry of space handles.
//!
//! Resolution is double-checked: the published map is consulted first, then
//! a creation lock for that one space id is taken and the map is checked
//! again before loading or creating. Unrelated spaces never wait on each
//! other, and concurrent first resolutions of one space converge on a single
//! [`Space`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tokio_util::sync::CancellationToken;

use spacesync_core::{SpaceDescriptor, SpaceId};
use spacesync_store::{SpaceStorage, SpaceStorageProvider, StoreError};

use crate::error::{Result, SpaceSyncError};
use crate::space::Space;

type CreationLock = Arc<tokio::sync::Mutex<()>>;

/// A creation lock shared by every resolution of one space id in flight.
/// The entry is dropped from the map when its last user leaves.
struct CreationEntry {
    lock: CreationLock,
    users: usize,
}

/// Use of a creation lock. Released on every exit path of `resolve`,
/// including errors and cancellation.
struct CreationSlot<'a> {
    registry: &'a SpaceRegistry,
    id: SpaceId,
    lock: CreationLock,
}

impl Drop for CreationSlot<'_> {
    fn drop(&mut self) {
        let mut locks = self.registry.creation_locks();
        if let Some(entry) = locks.get_mut(&self.id) {
            entry.users = entry.users.saturating_sub(1);
            if entry.users == 0 {
                locks.remove(&self.id);
            }
        }
    }
}

/// Keyed registry of [`Space`] handles backed by a storage provider.
pub struct SpaceRegistry {
    provider: Arc<dyn SpaceStorageProvider>,
    spaces: RwLock<HashMap<SpaceId, Arc<Space>>>,
    creation_locks: Mutex<HashMap<SpaceId, CreationEntry>>,
    max_pending: usize,
    instantiated: AtomicU64,
}

impl SpaceRegistry {
    pub fn new(provider: Arc<dyn SpaceStorageProvider>, max_pending: usize) -> Self {
        Self {
            provider,
            spaces: RwLock::new(HashMap::new()),
            creation_locks: Mutex::new(HashMap::new()),
            max_pending,
            instantiated: AtomicU64::new(0),
        }
    }

    pub fn provider(&self) -> &Arc<dyn SpaceStorageProvider> {
        &self.provider
    }

    /// Resolve the handle of a space, loading it from storage if needed.
    ///
    /// With a `hint`, a space unknown to storage is created from the hint.
    /// A space that already exists is returned as is; the hint never
    /// overwrites it.
    pub async fn resolve(
        &self,
        id: &SpaceId,
        hint: Option<&SpaceDescriptor>,
        cancel: &CancellationToken,
    ) -> Result<Arc<Space>> {
        if let Some(space) = self.get(id) {
            return Ok(space);
        }
        if let Some(hint) = hint {
            if hint.space_id() != id {
                return Err(SpaceSyncError::HintMismatch {
                    requested: id.clone(),
                    hint: hint.space_id().clone(),
                });
            }
        }

        let slot = self.creation_slot(id);
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SpaceSyncError::Cancelled),
            guard = slot.lock.lock() => guard,
        };

        if let Some(space) = self.get(id) {
            return Ok(space);
        }

        let storage = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SpaceSyncError::Cancelled),
            storage = self.open_or_create(id, hint) => storage?,
        };

        let space = {
            let mut spaces = self.write_spaces();
            Arc::clone(spaces.entry(id.clone()).or_insert_with(|| {
                self.instantiated.fetch_add(1, Ordering::SeqCst);
                Arc::new(Space::new(storage, self.max_pending))
            }))
        };
        tracing::debug!(space_id = %id, "space handle published");
        Ok(space)
    }

    async fn open_or_create(
        &self,
        id: &SpaceId,
        hint: Option<&SpaceDescriptor>,
    ) -> Result<Arc<dyn SpaceStorage>> {
        match self.provider.space_storage(id).await {
            Ok(storage) => Ok(storage),
            Err(e) if e.is_not_found() => {
                let Some(descriptor) = hint else {
                    return Err(SpaceSyncError::SpaceMissing(id.clone()));
                };
                match self.provider.create_space_storage(descriptor).await {
                    Ok(storage) => {
                        tracing::info!(space_id = %id, "created space from pushed descriptor");
                        Ok(storage)
                    }
                    // Persisted by someone else since the open above.
                    Err(StoreError::AlreadyExists(_)) => Ok(self.provider.space_storage(id).await?),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The published handle, if any.
    pub fn get(&self, id: &SpaceId) -> Option<Arc<Space>> {
        self.read_spaces().get(id).cloned()
    }

    /// Unpublish a handle. Storage is untouched.
    pub fn remove(&self, id: &SpaceId) -> Option<Arc<Space>> {
        self.write_spaces().remove(id)
    }

    pub fn len(&self) -> usize {
        self.read_spaces().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_spaces().is_empty()
    }

    /// How many handles have ever been created.
    pub fn instantiated(&self) -> u64 {
        self.instantiated.load(Ordering::SeqCst)
    }

    /// Space ids with a resolution currently loading or creating.
    pub fn pending_creations(&self) -> usize {
        self.creation_locks().len()
    }

    fn creation_slot(&self, id: &SpaceId) -> CreationSlot<'_> {
        let mut locks = self.creation_locks();
        let entry = locks.entry(id.clone()).or_insert_with(|| CreationEntry {
            lock: CreationLock::default(),
            users: 0,
        });
        entry.users += 1;
        CreationSlot {
            registry: self,
            id: id.clone(),
            lock: Arc::clone(&entry.lock),
        }
    }

    fn creation_locks(&self) -> MutexGuard<'_, HashMap<SpaceId, CreationEntry>> {
        self.creation_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_spaces(&self) -> std::sync::RwLockReadGuard<'_, HashMap<SpaceId, Arc<Space>>> {
        self.spaces.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_spaces(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<SpaceId, Arc<Space>>> {
        self.spaces.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
