//! # SpaceSync Store
//!
//! Storage abstraction for space sync. Provides a trait-based interface for
//! space persistence with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! A space's persisted state is its descriptor, an object index mapping each
//! object id to the hash of its heads, and the cached whole-space hash. The
//! sync layer only sees [`SpaceStorage`] and [`SpaceStorageProvider`].
//!
//! ## Key Types
//!
//! - [`SpaceStorage`] - Async trait over one space's index
//! - [`SpaceStorageProvider`] - Opens and creates space storages by id
//! - [`SqliteStorageProvider`] - SQLite-based persistent storage
//! - [`MemoryStorageProvider`] - In-memory storage for tests
//! - [`PutResult`] - Result of writing an object entry
//!
//! ## Usage
//!
//! ```rust,no_run
//! use spacesync_store::{SpaceStorageProvider, SqliteStorageProvider};
//! use spacesync_core::SpaceId;
//!
//! async fn example() {
//!     let provider = SqliteStorageProvider::open("spaces.db").unwrap();
//!
//!     match provider.space_storage(&SpaceId::from("space-1")).await {
//!         Ok(storage) => println!("hash: {}", storage.read_space_hash().await.unwrap()),
//!         Err(e) if e.is_not_found() => println!("not persisted"),
//!         Err(e) => panic!("{}", e),
//!     }
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent writes**: Writing an unchanged entry returns `Unchanged`
//! - **Key order**: Range queries return entries ordered by `(key, id)`
//! - **Cached hash**: The whole-space hash is rewritten in the same write as the index

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::{MemorySpaceStorage, MemoryStorageProvider};
pub use sqlite::{SqliteSpaceStorage, SqliteStorageProvider};
pub use traits::{PutResult, SpaceStorage, SpaceStorageExt, SpaceStorageProvider};
