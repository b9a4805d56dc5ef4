//! Whole-space agreement check without touching the object index.
//!
//! Most head syncs ask about the whole space and find nothing changed. The
//! resolver answers those from the storage's cached whole-space hash. Any
//! failure makes it decline so the caller falls back to the engine.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use spacesync_core::Blake3Hash;
use spacesync_store::SpaceStorageProvider;

use crate::messages::{HeadSyncRequest, HeadSyncResponse, RangeResult};

/// Answers single whole-space head sync requests from the cached hash.
#[derive(Clone)]
pub struct FastPathResolver {
    provider: Arc<dyn SpaceStorageProvider>,
}

impl FastPathResolver {
    pub fn new(provider: Arc<dyn SpaceStorageProvider>) -> Self {
        Self { provider }
    }

    /// Whether the request has the shape the fast path serves.
    pub fn applies(request: &HeadSyncRequest) -> bool {
        matches!(request.ranges.as_slice(), [only] if only.range.is_whole_space())
    }

    /// Try to answer the request from the cached whole-space hash.
    ///
    /// Returns `None` when the request does not qualify or the cached hash
    /// cannot be read. The claimed hash is not consulted; the requester
    /// compares.
    pub async fn try_resolve(
        &self,
        request: &HeadSyncRequest,
        cancel: &CancellationToken,
    ) -> Option<HeadSyncResponse> {
        if !Self::applies(request) {
            return None;
        }
        let range = request.ranges[0].range;

        let hash = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(space_id = %request.space_id, "fast path cancelled");
                return None;
            }
            hash = self.read_cached_hash(request) => hash,
        };

        match hash {
            Ok(hash) => {
                tracing::debug!(space_id = %request.space_id, %hash, "fast path hit");
                Some(HeadSyncResponse {
                    results: vec![RangeResult::hash_only(range, hash)],
                })
            }
            Err(reason) => {
                tracing::debug!(space_id = %request.space_id, %reason, "fast path declined");
                None
            }
        }
    }

    async fn read_cached_hash(&self, request: &HeadSyncRequest) -> Result<Blake3Hash, String> {
        let storage = self
            .provider
            .space_storage(&request.space_id)
            .await
            .map_err(|e| e.to_string())?;
        let hex = storage.read_space_hash().await.map_err(|e| e.to_string())?;
        Blake3Hash::from_hex(&hex).map_err(|e| e.to_string())
    }
}
