//! Client side of head sync.
//!
//! The driver starts from the whole-space range with the local hash and
//! walks each response tree. Nodes that agree are dropped. Nodes listing
//! elements are compared object by object. Hash-only nodes that disagree are
//! split locally (or asked for elements once narrow enough) and sent in the
//! next round.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use spacesync_core::{Blake3Hash, ObjectEntry, ObjectId, ObjectSet, Range, RangeHasher, SpaceId};
use spacesync_store::SpaceStorage;

use crate::engine::{HeadSyncConfig, HeadSyncEngine};
use crate::error::{Result, SyncError};
use crate::messages::{limits, HeadSyncRequest, HeadSyncResponse, RangeRequest, RangeResult};

/// Something that answers head sync requests for a remote replica.
#[async_trait]
pub trait HeadSyncClient: Send + Sync {
    async fn head_sync(&self, request: HeadSyncRequest) -> Result<HeadSyncResponse>;
}

/// Answers head sync from a storage handle in the same process.
pub struct LocalResponder<'a> {
    storage: &'a dyn SpaceStorage,
    engine: HeadSyncEngine,
}

impl<'a> LocalResponder<'a> {
    pub fn new(storage: &'a dyn SpaceStorage, config: HeadSyncConfig) -> Self {
        Self {
            storage,
            engine: HeadSyncEngine::new(config),
        }
    }
}

#[async_trait]
impl HeadSyncClient for LocalResponder<'_> {
    async fn head_sync(&self, request: HeadSyncRequest) -> Result<HeadSyncResponse> {
        self.engine
            .head_sync(self.storage, &request, &CancellationToken::new())
            .await
    }
}

/// Differences between the local replica and a peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    /// Objects the peer has and we don't.
    pub new_ids: Vec<ObjectId>,
    /// Objects both sides have with different hashes.
    pub changed_ids: Vec<ObjectId>,
    /// Objects we have and the peer doesn't.
    pub removed_ids: Vec<ObjectId>,
    /// Request rounds issued.
    pub rounds: usize,
}

impl DiffReport {
    /// Whether the replicas agree.
    pub fn is_empty(&self) -> bool {
        self.new_ids.is_empty() && self.changed_ids.is_empty() && self.removed_ids.is_empty()
    }

    fn finish(&mut self) {
        for ids in [&mut self.new_ids, &mut self.changed_ids, &mut self.removed_ids] {
            ids.sort();
            ids.dedup();
        }
    }
}

/// Find every object that differs between local storage and the peer.
pub async fn diff_with_peer<C>(
    space_id: &SpaceId,
    local: &dyn SpaceStorage,
    client: &C,
    config: &HeadSyncConfig,
    cancel: &CancellationToken,
) -> Result<DiffReport>
where
    C: HeadSyncClient + ?Sized,
{
    let local_set = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(SyncError::Cancelled),
        objects = local.objects_in(Range::WHOLE) => ObjectSet::from_entries(objects?),
    };

    let mut report = DiffReport::default();
    let mut pending = vec![RangeRequest::new(
        Range::WHOLE,
        RangeHasher::hash_range(&local_set, Range::WHOLE),
    )];

    while !pending.is_empty() {
        if report.rounds >= config.max_rounds {
            return Err(SyncError::RoundLimit(config.max_rounds));
        }
        report.rounds += 1;

        let mut next = Vec::new();
        for chunk in pending.chunks(limits::MAX_RANGES_PER_REQUEST) {
            let request = HeadSyncRequest {
                space_id: space_id.clone(),
                ranges: chunk.to_vec(),
            };
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                response = client.head_sync(request) => response?,
            };
            if response.results.len() != chunk.len() {
                return Err(SyncError::InvalidMessage(format!(
                    "expected {} results, got {}",
                    chunk.len(),
                    response.results.len()
                )));
            }
            for result in &response.results {
                walk(result, &local_set, config, &mut next, &mut report);
            }
        }

        tracing::debug!(
            space_id = %space_id,
            round = report.rounds,
            follow_ups = next.len(),
            "head sync round complete"
        );
        pending = next;
    }

    report.finish();
    Ok(report)
}

fn walk(
    root: &RangeResult,
    local: &ObjectSet,
    config: &HeadSyncConfig,
    next: &mut Vec<RangeRequest>,
    report: &mut DiffReport,
) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if let Some(elements) = &node.elements {
            compare_elements(node.range, elements, local, report);
            continue;
        }
        if !node.sub_results.is_empty() {
            stack.extend(node.sub_results.iter());
            continue;
        }

        let local_hash = RangeHasher::hash_range(local, node.range);
        if local_hash == node.hash || node.range.is_empty() {
            continue;
        }
        follow_up(node.range, local, local_hash, config, next);
    }
}

fn follow_up(
    range: Range,
    local: &ObjectSet,
    local_hash: Blake3Hash,
    config: &HeadSyncConfig,
    next: &mut Vec<RangeRequest>,
) {
    if config.at_floor(range, local.slice(range).len()) {
        next.push(RangeRequest::with_elements(range, local_hash));
        return;
    }
    for sub in range.split(config.split_width()) {
        next.push(RangeRequest::new(sub, RangeHasher::hash_range(local, sub)));
    }
}

fn compare_elements(
    range: Range,
    remote: &[ObjectEntry],
    local: &ObjectSet,
    report: &mut DiffReport,
) {
    let remote_by_id: HashMap<&ObjectId, &Blake3Hash> =
        remote.iter().map(|e| (&e.id, &e.hash)).collect();

    for entry in remote {
        match local.get(&entry.id) {
            None => report.new_ids.push(entry.id.clone()),
            Some(mine) if mine.hash != entry.hash => report.changed_ids.push(entry.id.clone()),
            Some(_) => {}
        }
    }
    for entry in local.slice(range) {
        if !remote_by_id.contains_key(&entry.id) {
            report.removed_ids.push(entry.id.clone());
        }
    }
}
