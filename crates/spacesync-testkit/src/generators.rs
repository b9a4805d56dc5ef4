//! Proptest generators for property-based testing.

use proptest::prelude::*;

use spacesync_core::{Blake3Hash, ObjectEntry, ObjectId, PeerId, Range, SpaceId};

/// Generate an object id.
pub fn object_id() -> impl Strategy<Value = ObjectId> {
    "[a-z][a-z0-9-]{0,23}".prop_map(ObjectId::new)
}

/// Generate a random Blake3Hash.
pub fn blake3_hash() -> impl Strategy<Value = Blake3Hash> {
    any::<[u8; 32]>().prop_map(Blake3Hash)
}

/// Generate an entry.
pub fn object_entry() -> impl Strategy<Value = ObjectEntry> {
    (object_id(), blake3_hash()).prop_map(|(id, hash)| ObjectEntry::new(id, hash))
}

/// Generate up to `max_len` entries with distinct ids.
pub fn object_entries(max_len: usize) -> impl Strategy<Value = Vec<ObjectEntry>> {
    prop::collection::btree_map(object_id(), blake3_hash(), 0..=max_len).prop_map(|map| {
        map.into_iter()
            .map(|(id, hash)| ObjectEntry::new(id, hash))
            .collect()
    })
}

/// Generate a non-empty range.
pub fn range() -> impl Strategy<Value = Range> {
    (any::<u64>(), any::<u64>())
        .prop_filter("bounds must differ", |(a, b)| a != b)
        .prop_map(|(a, b)| Range::new(a.min(b), a.max(b)))
}

/// Generate a peer id.
pub fn peer_id() -> impl Strategy<Value = PeerId> {
    any::<[u8; 32]>().prop_map(PeerId::from_bytes)
}

/// Generate a space id.
pub fn space_id() -> impl Strategy<Value = SpaceId> {
    "[a-z][a-z0-9.-]{0,31}".prop_map(SpaceId::new)
}
