//! # SpaceSync Sync
//!
//! Head sync anti-entropy and object stream routing.
//!
//! ## Overview
//!
//! Two replicas of a space find out where their object sets differ by
//! comparing range hashes over the object key space, subdividing only the
//! ranges that disagree. Once differences are known, changes flow over a
//! per-(peer, space) object stream.
//!
//! ## Key Types
//!
//! - [`HeadSyncEngine`] - Answers range comparisons from local storage
//! - [`FastPathResolver`] - Answers whole-space checks from the cached hash
//! - [`diff_with_peer`] - Client-side driver producing a [`DiffReport`]
//! - [`StreamRouter`] - One worker per (peer, space) stream
//! - [`ObjectStream`] - Transport-agnostic stream of [`ObjectSyncMessage`]s
//!
//! ## Usage
//!
//! ```rust,no_run
//! use spacesync_sync::{FastPathResolver, HeadSyncEngine, HeadSyncRequest};
//! use spacesync_store::{MemoryStorageProvider, SpaceStorageProvider};
//! use spacesync_core::{Blake3Hash, SpaceId};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example() {
//!     let provider = Arc::new(MemoryStorageProvider::new());
//!     let request = HeadSyncRequest::whole_space(SpaceId::from("s1"), Blake3Hash::ZERO);
//!     let cancel = CancellationToken::new();
//!
//!     let fast = FastPathResolver::new(provider.clone());
//!     let response = match fast.try_resolve(&request, &cancel).await {
//!         Some(response) => response,
//!         None => {
//!             let storage = provider.space_storage(&request.space_id).await.unwrap();
//!             HeadSyncEngine::default()
//!                 .head_sync(storage.as_ref(), &request, &cancel)
//!                 .await
//!                 .unwrap()
//!         }
//!     };
//!     println!("{:?}", response.results[0].hash);
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Client                                   Responder
//!   |-------- HeadSync [whole, H] ----------->|
//!   |<------- [whole, H'] + 16 sub-results ---|   H != H'
//!   |-------- HeadSync [sub ranges...] ------>|   only the mismatching ones
//!   |<------- elements at the floor ----------|
//!   |======== ObjectSyncStream ==============>|   changes both ways
//! ```

pub mod engine;
pub mod error;
pub mod fastpath;
pub mod messages;
pub mod reconcile;
pub mod router;
pub mod stream;

pub use engine::{HeadSyncConfig, HeadSyncEngine};
pub use error::{Result, SyncError};
pub use fastpath::FastPathResolver;
pub use messages::{
    limits, HeadSyncRequest, HeadSyncResponse, ObjectChange, ObjectSyncMessage, RangeRequest,
    RangeResult, SyncErrorCode, PROTOCOL_VERSION,
};
pub use reconcile::{diff_with_peer, DiffReport, HeadSyncClient, LocalResponder};
pub use router::{ObjectSyncHandler, StreamConfig, StreamRouter, WorkerExit, WorkerHandle};
pub use stream::{memory::duplex, memory::MemoryObjectStream, ObjectStream, StreamContext};
