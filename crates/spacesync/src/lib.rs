//! # SpaceSync
//!
//! Control plane for replicating spaces between peers.
//!
//! ## Overview
//!
//! A space is a named collection of objects plus a descriptor (header, ACL
//! payload, settings). Peers keep replicas of spaces and converge them with
//! four operations:
//!
//! - **Pull**: fetch the descriptor of a space the peer already has
//! - **Push**: hand a descriptor to a peer so it can create the space
//! - **HeadSync**: compare range hashes to locate differing objects
//! - **ObjectSyncStream**: exchange object changes over a long-lived stream
//!
//! ## Key Types
//!
//! - [`SpaceSyncFacade`] - Serves the four operations
//! - [`SpaceRegistry`] - One [`Space`] handle per space, created on demand
//! - [`PeerIdentityResolver`] - Who is on the other end of a stream
//! - [`RpcError`] - What a remote caller sees when a call fails
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use spacesync::{SpaceSyncConfig, SpaceSyncFacade};
//! use spacesync::store::SqliteStorageProvider;
//! use spacesync::core::{Blake3Hash, SpaceId};
//! use spacesync::sync::HeadSyncRequest;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example() {
//!     let provider = Arc::new(SqliteStorageProvider::open("spaces.db").unwrap());
//!     let facade = SpaceSyncFacade::new(provider, SpaceSyncConfig::default()).unwrap();
//!     let cancel = CancellationToken::new();
//!
//!     let request = HeadSyncRequest::whole_space(SpaceId::from("s1"), Blake3Hash::ZERO);
//!     match facade.head_sync(request, &cancel).await {
//!         Ok(response) => println!("peer hash: {}", response.results[0].hash),
//!         Err(e) => println!("head sync failed: {}", e),
//!     }
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `spacesync::core` - Identifiers, ranges, hashing, descriptors
//! - `spacesync::store` - Storage traits, memory and SQLite backends
//! - `spacesync::sync` - Head sync engine and stream router

pub mod config;
pub mod error;
pub mod facade;
pub mod identity;
pub mod registry;
pub mod space;

pub use spacesync_core as core;
pub use spacesync_store as store;
pub use spacesync_sync as sync;

pub use config::SpaceSyncConfig;
pub use error::{Result, RpcError, RpcResult, SpaceSyncError};
pub use facade::SpaceSyncFacade;
pub use identity::{ContextIdentity, PeerIdentityResolver};
pub use registry::SpaceRegistry;
pub use space::Space;

pub use spacesync_core::{
    Blake3Hash, ObjectEntry, ObjectId, PeerId, Range, SpaceDescriptor, SpaceHeader, SpaceId,
};
pub use spacesync_sync::{DiffReport, HeadSyncRequest, HeadSyncResponse, WorkerExit};
