//! Reconciling two replicas through their facades.

mod common;

use spacesync::store::SpaceStorage;
use spacesync::sync::SyncError;
use spacesync::{ObjectEntry, ObjectId, SpaceId, SpaceSyncError};
use spacesync_testkit::{content_hash, entries, scattered_entries, ReplicaPair};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_identical_replicas_need_one_round() -> anyhow::Result<()> {
    let objects = scattered_entries(11, 300);
    let (_pa, local, _sa) = common::seeded("s1", &objects).await?;
    let (_pb, remote, _sb) = common::seeded("s1", &objects).await?;

    let report = local
        .diff_space(&SpaceId::from("s1"), &remote, &CancellationToken::new())
        .await?;
    assert!(report.is_empty());
    assert_eq!(report.rounds, 1);
    Ok(())
}

#[tokio::test]
async fn test_diff_finds_every_kind_of_difference() -> anyhow::Result<()> {
    let base = scattered_entries(12, 400);
    let mut theirs = base.clone();
    // Changed on the peer.
    theirs[10] = ObjectEntry::new(theirs[10].id.clone(), content_hash("edited", 2));
    // Missing on the peer.
    let dropped = theirs.remove(200);
    // Only on the peer.
    theirs.push(ObjectEntry::new("fresh", content_hash("fresh", 1)));

    let pair = ReplicaPair::new("s1", &base, &theirs).await;
    let (local, remote) = common::replica_facades(&pair);

    let report = local
        .diff_space(&pair.space_id, &remote, &CancellationToken::new())
        .await?;
    assert_eq!(report.new_ids, vec![ObjectId::new("fresh")]);
    assert_eq!(report.changed_ids, vec![base[10].id.clone()]);
    assert_eq!(report.removed_ids, vec![dropped.id]);
    assert!(report.rounds >= 2);
    Ok(())
}

#[tokio::test]
async fn test_applying_the_diff_converges() -> anyhow::Result<()> {
    let pair = ReplicaPair::new("s1", &entries("doc", 80, 1), &entries("doc", 95, 2)).await;
    let (local, remote) = common::replica_facades(&pair);
    let (local_storage, remote_storage) = (pair.local_storage(), pair.remote_storage());
    let space_id = pair.space_id.clone();
    let cancel = CancellationToken::new();

    let report = local.diff_space(&space_id, &remote, &cancel).await?;
    assert_eq!(report.changed_ids.len(), 80);
    assert_eq!(report.new_ids.len(), 15);

    for id in report.new_ids.iter().chain(&report.changed_ids) {
        let entry = remote_storage.object(id).await?.expect("peer has the object");
        local_storage.put_object(&entry).await?;
    }

    let again = local.diff_space(&space_id, &remote, &cancel).await?;
    assert!(again.is_empty());
    assert_eq!(
        local_storage.read_space_hash().await?,
        remote_storage.read_space_hash().await?
    );
    Ok(())
}

#[tokio::test]
async fn test_peer_without_the_space() -> anyhow::Result<()> {
    let (_pa, local, _sa) = common::seeded("s1", &entries("doc", 5, 1)).await?;
    let (_pb, remote) = common::facade(Default::default());

    let err = local
        .diff_space(&SpaceId::from("s1"), &remote, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SpaceSyncError::Sync(SyncError::PeerError {
            code: spacesync::sync::SyncErrorCode::SpaceMissing,
            ..
        })
    ));
    assert_eq!(err.kind(), spacesync::core::ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_diff() -> anyhow::Result<()> {
    let (_pa, local, _sa) = common::seeded("s1", &entries("doc", 5, 1)).await?;
    let (_pb, remote, _sb) = common::seeded("s1", &entries("doc", 5, 2)).await?;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = local
        .diff_space(&SpaceId::from("s1"), &remote, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SpaceSyncError::Cancelled | SpaceSyncError::Sync(SyncError::Cancelled)));
    Ok(())
}
