//! Per-(peer, space) stream workers.
//!
//! The router owns a slot map keyed by `(PeerId, SpaceId)`. Registering a
//! stream claims the slot and spawns a worker task that owns the stream for
//! its whole life. A second registration for a claimed slot is rejected with
//! [`SyncError::StreamConflict`]; the active worker is left untouched.
//!
//! ## Worker lifecycle
//!
//! ```text
//! route() ──claim slot──> spawn worker
//!                           │
//!                           ├─ first payload (if any) ─> ingest, reply
//!                           └─ loop: recv frame ─> ingest ─> send pending
//!                                     │
//!   stream closed / error / close_space / shutdown ─> release slot
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use spacesync_core::{PeerId, SpaceId};

use crate::error::{Result, SyncError};
use crate::messages::ObjectSyncMessage;
use crate::stream::ObjectStream;

/// Receives change payloads for one space and produces outbound changes.
#[async_trait]
pub trait ObjectSyncHandler: Send + Sync + 'static {
    /// Apply a change payload received from `peer`.
    async fn ingest_change(&self, peer: &PeerId, payload: Bytes) -> Result<()>;

    /// Drain changes queued for `peer`.
    async fn pending_changes_for(&self, peer: &PeerId) -> Result<Vec<Bytes>>;
}

/// Configuration for object streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Buffer size of in-memory stream channels.
    pub channel_capacity: usize,
    /// Frames with larger payloads end the worker.
    pub max_payload_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            max_payload_bytes: crate::messages::limits::MAX_PAYLOAD_BYTES,
        }
    }
}

/// Why a worker stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The remote end closed the stream.
    StreamClosed,
    /// The space was torn down or the router shut down.
    Cancelled,
}

type SlotKey = (PeerId, SpaceId);

struct Slot {
    generation: u64,
    cancel: CancellationToken,
}

type SlotMap = Arc<Mutex<HashMap<SlotKey, Slot>>>;

fn lock(slots: &SlotMap) -> MutexGuard<'_, HashMap<SlotKey, Slot>> {
    // Slot bookkeeping never panics while holding the lock.
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases a slot when its worker ends, however it ends.
struct SlotGuard {
    slots: SlotMap,
    key: SlotKey,
    generation: u64,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut slots = lock(&self.slots);
        if slots.get(&self.key).map(|s| s.generation) == Some(self.generation) {
            slots.remove(&self.key);
        }
    }
}

/// Handle to a running worker.
pub struct WorkerHandle {
    peer: PeerId,
    space_id: SpaceId,
    join: JoinHandle<Result<WorkerExit>>,
}

impl WorkerHandle {
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    /// Wait for the worker to finish.
    pub async fn wait(self) -> Result<WorkerExit> {
        self.join
            .await
            .map_err(|e| SyncError::Handler(format!("worker task failed: {}", e)))?
    }
}

/// Enforces one worker per (peer, space) pair and routes frames to it.
pub struct StreamRouter {
    slots: SlotMap,
    generation: AtomicU64,
    shutdown: CancellationToken,
    config: StreamConfig,
}

impl Default for StreamRouter {
    fn default() -> Self {
        Self::new(StreamConfig::default())
    }
}

impl StreamRouter {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Hand a stream to a new worker for `(peer, first.space_id)`.
    ///
    /// `first` is the frame already read from the stream; its payload is
    /// processed before any further frames. Fails with `StreamConflict` if a
    /// worker is already active for the pair.
    pub fn route<S: ObjectStream>(
        &self,
        peer: PeerId,
        first: ObjectSyncMessage,
        stream: S,
        handler: Arc<dyn ObjectSyncHandler>,
    ) -> Result<WorkerHandle> {
        let space_id = first.space_id.clone();
        let key = (peer, space_id.clone());
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();

        {
            let mut slots = lock(&self.slots);
            if slots.contains_key(&key) {
                tracing::debug!(%peer, %space_id, "rejecting duplicate stream");
                return Err(SyncError::StreamConflict { peer, space_id });
            }
            slots.insert(
                key.clone(),
                Slot {
                    generation,
                    cancel: cancel.clone(),
                },
            );
        }

        let guard = SlotGuard {
            slots: Arc::clone(&self.slots),
            key,
            generation,
        };
        let worker = Worker {
            peer,
            space_id: space_id.clone(),
            handler,
            max_payload_bytes: self.config.max_payload_bytes,
        };

        tracing::debug!(%peer, %space_id, "stream worker started");
        let join = tokio::spawn(async move {
            let _guard = guard;
            let result = worker.run(stream, first.payload, cancel).await;
            match &result {
                Ok(exit) => {
                    tracing::debug!(peer = %worker.peer, space_id = %worker.space_id, ?exit, "stream worker stopped")
                }
                Err(e) => {
                    tracing::warn!(peer = %worker.peer, space_id = %worker.space_id, error = %e, "stream worker failed")
                }
            }
            result
        });

        Ok(WorkerHandle {
            peer,
            space_id,
            join,
        })
    }

    /// Stop every worker of a space. Returns how many were signalled.
    pub fn close_space(&self, space_id: &SpaceId) -> usize {
        let slots = lock(&self.slots);
        let mut closed = 0;
        for ((_, id), slot) in slots.iter() {
            if id == space_id {
                slot.cancel.cancel();
                closed += 1;
            }
        }
        closed
    }

    /// Stop the worker of one pair. Returns whether one was active.
    pub fn close_pair(&self, peer: &PeerId, space_id: &SpaceId) -> bool {
        match lock(&self.slots).get(&(*peer, space_id.clone())) {
            Some(slot) => {
                slot.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop every worker.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Number of active workers.
    pub fn active_workers(&self) -> usize {
        lock(&self.slots).len()
    }

    /// Whether a worker is active for the pair.
    pub fn is_active(&self, peer: &PeerId, space_id: &SpaceId) -> bool {
        lock(&self.slots).contains_key(&(*peer, space_id.clone()))
    }
}

struct Worker {
    peer: PeerId,
    space_id: SpaceId,
    handler: Arc<dyn ObjectSyncHandler>,
    max_payload_bytes: usize,
}

impl Worker {
    async fn run<S: ObjectStream>(
        &self,
        mut stream: S,
        first: Bytes,
        cancel: CancellationToken,
    ) -> Result<WorkerExit> {
        if !first.is_empty() {
            if let Some(exit) = self.process(&mut stream, first, &cancel).await? {
                return Ok(exit);
            }
        }

        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(WorkerExit::Cancelled),
                frame = stream.recv() => frame?,
            };
            let Some(frame) = frame else {
                return Ok(WorkerExit::StreamClosed);
            };
            if frame.space_id != self.space_id {
                return Err(SyncError::InvalidMessage(format!(
                    "frame for space {} on stream bound to {}",
                    frame.space_id, self.space_id
                )));
            }
            if let Some(exit) = self.process(&mut stream, frame.payload, &cancel).await? {
                return Ok(exit);
            }
        }
    }

    /// Ingest one payload and flush the peer's outbox. Returns an exit when
    /// cancelled part way, so a peer that stops reading cannot pin the worker.
    async fn process<S: ObjectStream>(
        &self,
        stream: &mut S,
        payload: Bytes,
        cancel: &CancellationToken,
    ) -> Result<Option<WorkerExit>> {
        if payload.len() > self.max_payload_bytes {
            return Err(SyncError::InvalidMessage(format!(
                "payload of {} bytes exceeds {}",
                payload.len(),
                self.max_payload_bytes
            )));
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Some(WorkerExit::Cancelled)),
            ingested = self.handler.ingest_change(&self.peer, payload) => ingested?,
        }

        let pending = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Some(WorkerExit::Cancelled)),
            pending = self.handler.pending_changes_for(&self.peer) => pending?,
        };
        for change in pending {
            let message = ObjectSyncMessage {
                space_id: self.space_id.clone(),
                payload: change,
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Some(WorkerExit::Cancelled)),
                sent = stream.send(message) => sent?,
            }
        }
        Ok(None)
    }
}
