//! # SpaceSync Testkit
//!
//! Shared fixtures and proptest strategies for the SpaceSync crates.
//!
//! [`fixtures`] builds descriptors, object entries, changes, and seeded
//! replica pairs. [`generators`] holds the strategies used by property tests.
//!
//! ## Strategies
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use spacesync_testkit::generators::object_entries;
//!
//! proptest! {
//!     #[test]
//!     fn set_is_sorted(entries in object_entries(64)) {
//!         let set = ObjectSet::from_entries(entries);
//!         prop_assert!(set.entries().windows(2).all(|w| w[0].key() <= w[1].key()));
//!     }
//! }
//! ```
//!
//! ## Fixtures
//!
//! ```rust
//! use spacesync_testkit::fixtures::{descriptor, entries};
//!
//! let descriptor = descriptor("my-space");
//! let objects = entries("doc", 10, 1);
//! assert_eq!(objects.len(), 10);
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    change, content_hash, descriptor, descriptor_with_acl, entries, peers, scattered_entries,
    ReplicaPair,
};
