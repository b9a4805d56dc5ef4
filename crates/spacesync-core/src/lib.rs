//! # Space Sync Core
//!
//! Pure primitives for the space sync control plane: identifiers, key ranges,
//! range hashing, and space descriptors.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over the data exchanged by the head sync protocol.
//!
//! ## Key Types
//!
//! - [`SpaceId`] - Opaque identifier of a space
//! - [`PeerId`] - Identity of a remote peer
//! - [`ObjectId`] / [`ObjectEntry`] - An object and the hash of its heads
//! - [`Range`] - A half-open span `[from, to)` of the object key space
//! - [`RangeHasher`] - Deterministic aggregate hash over a range of objects
//! - [`SpaceDescriptor`] - The transferable description of a space
//!
//! ## Key Space
//!
//! Every object id maps to a `u64` key (see [`ObjectId::key`]). The sentinel
//! [`Range::WHOLE`] is `[0, u64::MAX)`; the top key is reserved so that the
//! sentinel covers every object.

pub mod codec;
pub mod descriptor;
pub mod error;
pub mod hash;
pub mod hasher;
pub mod object;
pub mod range;
pub mod types;
pub mod validation;

pub use codec::{decode, encode};
pub use descriptor::{SpaceDescriptor, SpaceHeader};
pub use error::{CoreError, ErrorKind};
pub use hash::Blake3Hash;
pub use hasher::{RangeDigest, RangeHasher};
pub use object::{ObjectEntry, ObjectId, ObjectSet};
pub use range::Range;
pub use types::{PeerId, SpaceId};
pub use validation::validate_descriptor;
