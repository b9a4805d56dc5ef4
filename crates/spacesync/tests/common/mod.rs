//! Shared setup for the integration suites.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use spacesync::store::{MemorySpaceStorage, MemoryStorageProvider, SpaceStorageExt};
use spacesync::{ObjectEntry, SpaceSyncConfig, SpaceSyncFacade};
use spacesync_testkit::{descriptor, ReplicaPair};
use tokio_util::sync::CancellationToken;

/// Route `tracing` output through the test harness. `RUST_LOG` selects levels.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn facade(config: SpaceSyncConfig) -> (Arc<MemoryStorageProvider>, SpaceSyncFacade) {
    init_tracing();
    let provider = Arc::new(MemoryStorageProvider::new());
    let facade = SpaceSyncFacade::new(provider.clone(), config).expect("valid config");
    (provider, facade)
}

/// A facade holding space `id` seeded with `entries`.
pub async fn seeded(
    id: &str,
    entries: &[ObjectEntry],
) -> anyhow::Result<(Arc<MemoryStorageProvider>, SpaceSyncFacade, Arc<MemorySpaceStorage>)> {
    let (provider, facade) = facade(SpaceSyncConfig::default());
    facade
        .push(descriptor(id), &CancellationToken::new())
        .await?;
    let storage = provider
        .memory_storage(&id.into())
        .ok_or_else(|| anyhow::anyhow!("space {} not created", id))?;
    storage.put_objects(entries).await?;
    Ok((provider, facade, storage))
}

/// Facades over the local and remote sides of a replica pair.
pub fn replica_facades(pair: &ReplicaPair) -> (SpaceSyncFacade, SpaceSyncFacade) {
    init_tracing();
    let local = SpaceSyncFacade::new(pair.local.clone(), SpaceSyncConfig::default())
        .expect("valid config");
    let remote = SpaceSyncFacade::new(pair.remote.clone(), SpaceSyncConfig::default())
        .expect("valid config");
    (local, remote)
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
