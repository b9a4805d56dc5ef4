//! Objects inside a space and their placement in the key space.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::hash::Blake3Hash;
use crate::range::Range;

/// Domain tag for deriving object keys.
const KEY_DOMAIN: &[u8] = b"spacesync-key-v0:";

/// Opaque identifier of an object inside a space.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Create an object id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Position of this object in the `u64` key space.
    ///
    /// The first 8 bytes of `Blake3(KEY_DOMAIN || id)`, big-endian, clamped
    /// below `u64::MAX` so that [`Range::WHOLE`] contains every key.
    pub fn key(&self) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(KEY_DOMAIN);
        hasher.update(self.0.as_bytes());
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_be_bytes(prefix).min(u64::MAX - 1)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An object and the hash summarizing its current heads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub id: ObjectId,
    pub hash: Blake3Hash,
}

impl ObjectEntry {
    pub fn new(id: impl Into<ObjectId>, hash: Blake3Hash) -> Self {
        Self {
            id: id.into(),
            hash,
        }
    }

    /// Key of the entry's object.
    pub fn key(&self) -> u64 {
        self.id.key()
    }
}

/// Entries sorted by `(key, id)` and unique by id.
///
/// Keys are cached alongside entries so that range slicing is a pair of
/// binary searches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectSet {
    keys: Vec<u64>,
    entries: Vec<ObjectEntry>,
}

impl ObjectSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from entries in any order.
    ///
    /// When the same id appears more than once, the last occurrence wins.
    pub fn from_entries(entries: impl IntoIterator<Item = ObjectEntry>) -> Self {
        let mut by_id = HashMap::new();
        for entry in entries {
            by_id.insert(entry.id.clone(), entry);
        }
        // Ties on key are broken by id.
        let mut keyed: Vec<(u64, ObjectEntry)> =
            by_id.into_values().map(|e| (e.key(), e)).collect();
        keyed.sort_by(|(ka, a), (kb, b)| ka.cmp(kb).then_with(|| a.id.cmp(&b.id)));
        let (keys, entries) = keyed.into_iter().unzip();
        Self { keys, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in key order.
    pub fn entries(&self) -> &[ObjectEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ObjectEntry> {
        self.entries
    }

    /// Index bounds `[start, end)` of the entries whose keys fall in `range`.
    pub fn bounds(&self, range: Range) -> (usize, usize) {
        if range.is_empty() {
            return (0, 0);
        }
        let start = self.keys.partition_point(|&k| k < range.from);
        let end = self.keys.partition_point(|&k| k < range.to);
        (start, end.max(start))
    }

    /// Entries whose keys fall in `range`, in key order.
    pub fn slice(&self, range: Range) -> &[ObjectEntry] {
        let (start, end) = self.bounds(range);
        &self.entries[start..end]
    }

    /// A new set holding only the entries inside `range`.
    pub fn restrict(&self, range: Range) -> ObjectSet {
        let (start, end) = self.bounds(range);
        Self {
            keys: self.keys[start..end].to_vec(),
            entries: self.entries[start..end].to_vec(),
        }
    }

    /// Look up an entry by id.
    pub fn get(&self, id: &ObjectId) -> Option<&ObjectEntry> {
        let key = id.key();
        let start = self.keys.partition_point(|&k| k < key);
        self.entries[start..]
            .iter()
            .take_while(|e| e.key() == key)
            .find(|e| &e.id == id)
    }
}

impl FromIterator<ObjectEntry> for ObjectSet {
    fn from_iter<I: IntoIterator<Item = ObjectEntry>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> ObjectEntry {
        ObjectEntry::new(id, Blake3Hash::hash(id.as_bytes()))
    }

    #[test]
    fn test_key_is_deterministic() {
        let id = ObjectId::from("doc-1");
        assert_eq!(id.key(), ObjectId::from("doc-1").key());
        assert_ne!(id.key(), ObjectId::from("doc-2").key());
    }

    #[test]
    fn test_key_never_reaches_top() {
        for i in 0..1000 {
            let id = ObjectId::new(format!("obj-{}", i));
            assert!(Range::WHOLE.contains(id.key()));
        }
    }

    #[test]
    fn test_set_is_sorted_by_key() {
        let set = ObjectSet::from_entries((0..50).map(|i| entry(&format!("o{}", i))));
        let keys: Vec<u64> = set.entries().iter().map(ObjectEntry::key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_duplicate_ids_keep_last() {
        let newer = ObjectEntry::new("a", Blake3Hash::hash(b"v2"));
        let set = ObjectSet::from_entries(vec![entry("a"), newer.clone()]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&ObjectId::from("a")), Some(&newer));
    }

    #[test]
    fn test_slice_matches_contains() {
        let set = ObjectSet::from_entries((0..200).map(|i| entry(&format!("o{}", i))));
        let range = Range::new(u64::MAX / 4, u64::MAX / 2);
        let sliced = set.slice(range);
        let expected: Vec<&ObjectEntry> = set
            .entries()
            .iter()
            .filter(|e| range.contains(e.key()))
            .collect();
        assert_eq!(sliced.iter().collect::<Vec<_>>(), expected);
        assert_eq!(set.restrict(range).len(), expected.len());
    }

    #[test]
    fn test_slice_of_empty_range() {
        let set = ObjectSet::from_entries(vec![entry("a"), entry("b")]);
        assert!(set.slice(Range::new(10, 10)).is_empty());
        assert!(set.slice(Range::new(10, 3)).is_empty());
    }

    #[test]
    fn test_get_missing() {
        let set = ObjectSet::from_entries(vec![entry("a")]);
        assert!(set.get(&ObjectId::from("b")).is_none());
    }
}
