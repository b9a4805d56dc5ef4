//! Range reconciliation on the responder side.
//!
//! For each requested range the engine hashes its own objects in the span.
//! Matching ranges are answered with the hash alone. Mismatching ranges are
//! subdivided on an explicit worklist until either the node is small enough
//! to list its objects or the expansion depth is reached, in which case the
//! requester follows up on that node in its next round.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use spacesync_core::{Blake3Hash, ObjectEntry, ObjectSet, Range, RangeHasher};
use spacesync_store::SpaceStorage;

use crate::error::{Result, SyncError};
use crate::messages::{HeadSyncRequest, HeadSyncResponse, RangeRequest, RangeResult};

/// Configuration for head sync on both sides of the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadSyncConfig {
    /// Number of sub-ranges a mismatching range splits into.
    pub fan_out: u64,
    /// Ranges holding at most this many objects are answered with elements.
    pub compact_threshold: usize,
    /// How many levels the responder expands a mismatch in one response.
    pub expand_depth: usize,
    /// Upper bound on request rounds the requester will issue.
    pub max_rounds: usize,
}

impl Default for HeadSyncConfig {
    fn default() -> Self {
        Self {
            fan_out: 16,
            compact_threshold: 16,
            expand_depth: 1,
            max_rounds: 64,
        }
    }
}

impl HeadSyncConfig {
    /// Whether a node is small enough to list its objects.
    pub(crate) fn at_floor(&self, range: Range, count: usize) -> bool {
        count <= self.compact_threshold || range.width() <= self.split_width()
    }

    /// Split width actually used. A fan-out below two could never narrow a range.
    pub(crate) fn split_width(&self) -> u64 {
        self.fan_out.max(2)
    }
}

/// Responder-side range reconciliation.
#[derive(Debug, Clone, Default)]
pub struct HeadSyncEngine {
    config: HeadSyncConfig,
}

struct Node {
    range: Range,
    depth: usize,
    hash: Blake3Hash,
    elements: Option<Vec<ObjectEntry>>,
    children: Vec<usize>,
}

impl HeadSyncEngine {
    pub fn new(config: HeadSyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HeadSyncConfig {
        &self.config
    }

    /// Answer a head sync request from local storage.
    ///
    /// Ranges are answered in request order and independently of each other.
    /// A storage failure on any range fails the whole request.
    pub async fn head_sync(
        &self,
        storage: &dyn SpaceStorage,
        request: &HeadSyncRequest,
        cancel: &CancellationToken,
    ) -> Result<HeadSyncResponse> {
        request
            .validate_limits()
            .map_err(|e| SyncError::InvalidMessage(e.into()))?;
        if &request.space_id != storage.space_id() {
            return Err(SyncError::InvalidMessage(format!(
                "request for space {} sent to {}",
                request.space_id,
                storage.space_id()
            )));
        }

        let mut results = Vec::with_capacity(request.ranges.len());
        for req in &request.ranges {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if req.range.is_empty() {
                results.push(RangeResult::hash_only(req.range, RangeHasher::empty()));
                continue;
            }

            let objects = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                objects = storage.objects_in(req.range) => objects?,
            };
            let set = ObjectSet::from_entries(objects);
            results.push(self.resolve_range(&set, req, cancel)?);
        }

        Ok(HeadSyncResponse { results })
    }

    /// Answer one range against an in-memory object set.
    pub fn resolve_range(
        &self,
        set: &ObjectSet,
        req: &RangeRequest,
        cancel: &CancellationToken,
    ) -> Result<RangeResult> {
        let hash = RangeHasher::hash_range(set, req.range);
        if hash == req.hash && !req.elements {
            return Ok(RangeResult::hash_only(req.range, hash));
        }

        let mut arena = vec![Node {
            range: req.range,
            depth: 0,
            hash,
            elements: None,
            children: Vec::new(),
        }];
        let mut stack = vec![0usize];

        while let Some(idx) = stack.pop() {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let (range, depth) = (arena[idx].range, arena[idx].depth);
            let slice = set.slice(range);

            if req.elements || self.config.at_floor(range, slice.len()) {
                arena[idx].elements = Some(slice.to_vec());
                continue;
            }
            if depth >= self.config.expand_depth {
                continue;
            }

            for sub in range.split(self.config.split_width()) {
                let sub_slice = set.slice(sub);
                let child = arena.len();
                arena.push(Node {
                    range: sub,
                    depth: depth + 1,
                    hash: RangeHasher::hash(sub_slice),
                    elements: None,
                    children: Vec::new(),
                });
                arena[idx].children.push(child);
                if !sub_slice.is_empty() {
                    stack.push(child);
                }
            }
        }

        Ok(assemble(arena))
    }
}

/// Fold the arena into a result tree. Children always sit after their parent.
fn assemble(arena: Vec<Node>) -> RangeResult {
    let mut built: Vec<Option<RangeResult>> = Vec::with_capacity(arena.len());
    built.resize_with(arena.len(), || None);

    for (idx, node) in arena.into_iter().enumerate().rev() {
        let sub_results = node
            .children
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        built[idx] = Some(RangeResult {
            range: node.range,
            hash: node.hash,
            elements: node.elements,
            sub_results,
        });
    }

    built
        .into_iter()
        .next()
        .flatten()
        .unwrap_or_else(|| RangeResult::hash_only(Range::new(0, 0), RangeHasher::empty()))
}
