//! Head sync through the facade: agreement, difference location, and the
//! cached-hash fast path.

mod common;

use spacesync::core::{ObjectSet, RangeHasher};
use spacesync::store::SpaceStorage;
use spacesync::sync::{HeadSyncEngine, RangeRequest, RangeResult};
use spacesync::{Blake3Hash, HeadSyncRequest, ObjectEntry, ObjectId, Range, RpcError, SpaceId};
use spacesync_testkit::{content_hash, entries, scattered_entries};
use tokio_util::sync::CancellationToken;

/// The deepest result on the path to `key` that carries elements.
fn elements_for(result: &RangeResult, key: u64) -> Option<&Vec<ObjectEntry>> {
    if !result.range.contains(key) {
        return None;
    }
    result
        .sub_results
        .iter()
        .find_map(|sub| elements_for(sub, key))
        .or(result.elements.as_ref())
}

#[tokio::test]
async fn test_identical_replicas_agree() -> anyhow::Result<()> {
    let objects = scattered_entries(1, 200);
    let (_provider, facade, _storage) = common::seeded("s1", &objects).await?;
    let hash = RangeHasher::hash_range(&ObjectSet::from_entries(objects.clone()), Range::WHOLE);

    let response = facade
        .head_sync(
            HeadSyncRequest::whole_space(SpaceId::from("s1"), hash),
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(response.results.len(), 1);
    let result = &response.results[0];
    assert_eq!(result.range, Range::WHOLE);
    assert_eq!(result.hash, hash);
    assert!(result.sub_results.is_empty());
    assert!(result.elements.is_none());
    Ok(())
}

#[tokio::test]
async fn test_identical_partial_range_agrees() -> anyhow::Result<()> {
    let objects = scattered_entries(2, 200);
    let (_provider, facade, _storage) = common::seeded("s1", &objects).await?;
    let set = ObjectSet::from_entries(objects);
    let ranges: Vec<RangeRequest> = [Range::new(0, u64::MAX / 2), Range::new(u64::MAX / 2, u64::MAX)]
        .into_iter()
        .map(|range| RangeRequest::new(range, RangeHasher::hash_range(&set, range)))
        .collect();

    let response = facade
        .head_sync(
            HeadSyncRequest {
                space_id: SpaceId::from("s1"),
                ranges: ranges.clone(),
            },
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(response.results.len(), 2);
    for (request, result) in ranges.iter().zip(&response.results) {
        assert_eq!(result.range, request.range);
        assert_eq!(result.hash, request.hash);
        assert!(result.is_hash_only());
        assert!(result.sub_results.is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn test_single_difference_is_named() -> anyhow::Result<()> {
    let mut objects = entries("doc", 60, 1);
    let (_provider, facade, _storage) = common::seeded("s1", &objects).await?;

    // The requesting replica holds a newer version of one object.
    objects[17] = ObjectEntry::new("doc-17", content_hash("doc-17", 2));
    let requester_hash = RangeHasher::hash_range(&ObjectSet::from_entries(objects), Range::WHOLE);

    let response = facade
        .head_sync(
            HeadSyncRequest::whole_space(SpaceId::from("s1"), requester_hash),
            &CancellationToken::new(),
        )
        .await?;

    let root = &response.results[0];
    assert_ne!(root.hash, requester_hash);
    assert!(!root.sub_results.is_empty());

    let id = ObjectId::new("doc-17");
    let elements = elements_for(root, id.key()).expect("difference reaches the floor");
    let local = elements.iter().find(|e| e.id == id).expect("object is named");
    assert_eq!(local.hash, content_hash("doc-17", 1));
    Ok(())
}

#[tokio::test]
async fn test_fast_path_skips_object_index() -> anyhow::Result<()> {
    let objects = scattered_entries(3, 300);
    let (_provider, facade, storage) = common::seeded("S1", &objects).await?;
    let cancel = CancellationToken::new();

    let index_reads = storage.index_reads();
    let hash_reads = storage.hash_reads();
    let local_hash = RangeHasher::hash_range(&ObjectSet::from_entries(objects), Range::WHOLE);

    let response = facade
        .head_sync(HeadSyncRequest::whole_space(SpaceId::from("S1"), local_hash), &cancel)
        .await?;

    assert_eq!(storage.index_reads(), index_reads);
    assert_eq!(storage.hash_reads(), hash_reads + 1);
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].range, Range::WHOLE);
    assert_eq!(response.results[0].hash, local_hash);
    assert!(response.results[0].is_hash_only());

    let engine = HeadSyncEngine::new(facade.config().head_sync.clone());
    let computed = engine
        .head_sync(
            &*storage,
            &HeadSyncRequest::whole_space(SpaceId::from("S1"), local_hash),
            &cancel,
        )
        .await?;
    assert_eq!(computed, response);
    Ok(())
}

#[tokio::test]
async fn test_fast_path_ignores_claimed_hash() -> anyhow::Result<()> {
    let objects = scattered_entries(4, 100);
    let (_provider, facade, storage) = common::seeded("s1", &objects).await?;
    let index_reads = storage.index_reads();

    let response = facade
        .head_sync(
            HeadSyncRequest::whole_space(SpaceId::from("s1"), content_hash("other", 1)),
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(storage.index_reads(), index_reads);
    let cached = Blake3Hash::from_hex(&storage.read_space_hash().await?)?;
    assert_eq!(response.results[0].hash, cached);
    assert!(response.results[0].sub_results.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_fallback_is_transparent() -> anyhow::Result<()> {
    let objects = scattered_entries(5, 250);
    let (_provider, facade, storage) = common::seeded("s1", &objects).await?;
    let cancel = CancellationToken::new();
    let engine = HeadSyncEngine::new(facade.config().head_sync.clone());
    let local_hash =
        RangeHasher::hash_range(&ObjectSet::from_entries(objects.clone()), Range::WHOLE);

    for claimed in [local_hash, content_hash("stale", 1)] {
        let request = HeadSyncRequest::whole_space(SpaceId::from("s1"), claimed);
        let expected = engine.head_sync(&*storage, &request, &cancel).await?;

        storage.set_fail_hash_reads(true);
        let failed_read = facade.head_sync(request.clone(), &cancel).await?;
        storage.set_fail_hash_reads(false);
        assert_eq!(failed_read, expected);

        storage.overwrite_space_hash("not-hex");
        let malformed = facade.head_sync(request.clone(), &cancel).await?;
        assert_eq!(malformed, expected);

        storage.overwrite_space_hash(&local_hash.to_hex()[..16]);
        let truncated = facade.head_sync(request, &cancel).await?;
        assert_eq!(truncated, expected);

        storage.overwrite_space_hash(&local_hash.to_hex());
    }
    Ok(())
}

#[tokio::test]
async fn test_multiple_ranges_use_engine() -> anyhow::Result<()> {
    let objects = scattered_entries(6, 50);
    let (_provider, facade, storage) = common::seeded("s1", &objects).await?;
    let set = ObjectSet::from_entries(objects);
    let hash = RangeHasher::hash_range(&set, Range::WHOLE);

    let index_reads = storage.index_reads();
    let response = facade
        .head_sync(
            HeadSyncRequest {
                space_id: SpaceId::from("s1"),
                ranges: vec![
                    RangeRequest::new(Range::WHOLE, hash),
                    RangeRequest::new(Range::WHOLE, hash),
                ],
            },
            &CancellationToken::new(),
        )
        .await?;

    assert!(storage.index_reads() > index_reads);
    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[0], response.results[1]);
    assert_eq!(response.results[0].hash, hash);
    Ok(())
}

#[tokio::test]
async fn test_empty_range_gets_empty_hash() -> anyhow::Result<()> {
    let (_provider, facade, _storage) = common::seeded("s1", &entries("doc", 10, 1)).await?;
    let response = facade
        .head_sync(
            HeadSyncRequest {
                space_id: SpaceId::from("s1"),
                ranges: vec![RangeRequest::new(Range::new(10, 10), RangeHasher::empty())],
            },
            &CancellationToken::new(),
        )
        .await?;
    assert_eq!(
        response.results,
        vec![RangeResult::hash_only(Range::new(10, 10), RangeHasher::empty())]
    );
    Ok(())
}

#[tokio::test]
async fn test_storage_failure_is_unexpected() -> anyhow::Result<()> {
    let (_provider, facade, storage) = common::seeded("s1", &entries("doc", 10, 1)).await?;
    storage.set_fail_index_reads(true);

    let err = facade
        .head_sync(
            HeadSyncRequest {
                space_id: SpaceId::from("s1"),
                ranges: vec![RangeRequest::new(Range::new(0, 1 << 40), RangeHasher::empty())],
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err, RpcError::Unexpected);
    Ok(())
}

#[tokio::test]
async fn test_unknown_space_is_missing() {
    let (_provider, facade) = common::facade(Default::default());
    let err = facade
        .head_sync(
            HeadSyncRequest::whole_space(SpaceId::from("unknown-space"), RangeHasher::empty()),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err, RpcError::SpaceMissing);
}

#[tokio::test]
async fn test_cached_hash_follows_mixed_writes() -> anyhow::Result<()> {
    let objects = scattered_entries(7, 120);
    let (_provider, facade, storage) = common::seeded("s1", &objects).await?;
    let cancel = CancellationToken::new();

    for (i, entry) in objects.iter().enumerate() {
        match i % 3 {
            0 => {
                storage.remove_object(&entry.id).await?;
            }
            1 => {
                storage
                    .put_object(&ObjectEntry::new(entry.id.clone(), content_hash(entry.id.as_str(), 9)))
                    .await?;
            }
            _ => {}
        }
    }
    for extra in entries("late", 15, 1) {
        storage.put_object(&extra).await?;
    }

    let request = HeadSyncRequest::whole_space(SpaceId::from("s1"), RangeHasher::empty());
    let fast = facade.head_sync(request.clone(), &cancel).await?;
    let engine = HeadSyncEngine::new(facade.config().head_sync.clone());
    let computed = engine.head_sync(&*storage, &request, &cancel).await?;
    assert_eq!(fast.results[0].hash, computed.results[0].hash);

    let remaining = storage.objects_in(Range::WHOLE).await?;
    assert_eq!(remaining.len(), 80 + 15);
    assert_eq!(fast.results[0].hash, RangeHasher::hash(&remaining));
    Ok(())
}
