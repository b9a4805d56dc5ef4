//! Aggregate hashing over contiguous key ranges.
//!
//! Two replicas holding the same objects in a range compute the same range
//! hash, independent of insertion order. Any difference in membership or in
//! an object's head hash changes the aggregate.
//!
//! The aggregate is built from a [`RangeDigest`]: a wrapping 256-bit sum of
//! per-object leaf hashes plus an object count. Because the sum is
//! commutative and invertible, storage can keep the whole-space digest up to
//! date in constant time per write instead of rehashing every object.

use crate::hash::Blake3Hash;
use crate::object::{ObjectEntry, ObjectSet};
use crate::range::Range;

/// Domain tag for per-object leaf hashes.
const LEAF_DOMAIN: &[u8] = b"spacesync-range-leaf-v1:";

/// Domain tag for finished range hashes.
const RANGE_DOMAIN: &[u8] = b"spacesync-range-v1:";

type Limbs = [u64; 4];

/// Order-independent accumulator behind every range hash.
///
/// Algorithm:
/// 1. leaf(e) = Blake3(LEAF_DOMAIN || key_be || len(id)_be32 || id || hash)
/// 2. sum = Σ leaf(e) mod 2^256, read as little-endian
/// 3. hash = Blake3(RANGE_DOMAIN || count_be || sum_le)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeDigest {
    sum: Limbs,
    count: u64,
}

impl RangeDigest {
    /// Digest of the empty set.
    pub const fn new() -> Self {
        Self {
            sum: [0; 4],
            count: 0,
        }
    }

    /// Rebuild a digest from its stored form.
    pub fn from_parts(sum: [u8; 32], count: u64) -> Self {
        Self {
            sum: to_limbs(&sum),
            count,
        }
    }

    /// The 256-bit sum, little-endian. Persisted next to [`Self::count`].
    pub fn sum_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (chunk, limb) in out.chunks_exact_mut(8).zip(self.sum) {
            chunk.copy_from_slice(&limb.to_le_bytes());
        }
        out
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Fold in an object.
    pub fn add(&mut self, entry: &ObjectEntry) {
        let leaf = leaf(entry);
        let mut carry = false;
        for (acc, limb) in self.sum.iter_mut().zip(leaf) {
            let (partial, c1) = acc.overflowing_add(limb);
            let (total, c2) = partial.overflowing_add(carry as u64);
            *acc = total;
            carry = c1 || c2;
        }
        self.count = self.count.wrapping_add(1);
    }

    /// Take out an object previously added.
    pub fn remove(&mut self, entry: &ObjectEntry) {
        let leaf = leaf(entry);
        let mut borrow = false;
        for (acc, limb) in self.sum.iter_mut().zip(leaf) {
            let (partial, b1) = acc.overflowing_sub(limb);
            let (total, b2) = partial.overflowing_sub(borrow as u64);
            *acc = total;
            borrow = b1 || b2;
        }
        self.count = self.count.wrapping_sub(1);
    }

    /// Swap an object's old head for its new one.
    pub fn replace(&mut self, old: &ObjectEntry, new: &ObjectEntry) {
        self.remove(old);
        self.add(new);
    }

    /// The range hash of the objects folded in so far.
    pub fn finish(&self) -> Blake3Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(RANGE_DOMAIN);
        hasher.update(&self.count.to_be_bytes());
        hasher.update(&self.sum_bytes());
        Blake3Hash(*hasher.finalize().as_bytes())
    }
}

impl<'a> FromIterator<&'a ObjectEntry> for RangeDigest {
    fn from_iter<I: IntoIterator<Item = &'a ObjectEntry>>(entries: I) -> Self {
        let mut digest = Self::new();
        for entry in entries {
            digest.add(entry);
        }
        digest
    }
}

fn leaf(entry: &ObjectEntry) -> Limbs {
    let id = entry.id.as_str().as_bytes();
    let mut hasher = blake3::Hasher::new();
    hasher.update(LEAF_DOMAIN);
    hasher.update(&entry.key().to_be_bytes());
    hasher.update(&(id.len() as u32).to_be_bytes());
    hasher.update(id);
    hasher.update(entry.hash.as_bytes());
    to_limbs(hasher.finalize().as_bytes())
}

fn to_limbs(bytes: &[u8; 32]) -> Limbs {
    let mut limbs = [0u64; 4];
    for (limb, chunk) in limbs.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        *limb = u64::from_le_bytes(buf);
    }
    limbs
}

/// Computes deterministic aggregate hashes over object entries.
pub struct RangeHasher;

impl RangeHasher {
    /// Hash a collection of entries. Order does not matter, but ids must be
    /// unique.
    pub fn hash(entries: &[ObjectEntry]) -> Blake3Hash {
        entries.iter().collect::<RangeDigest>().finish()
    }

    /// Hash the entries of `set` that fall in `range`.
    pub fn hash_range(set: &ObjectSet, range: Range) -> Blake3Hash {
        Self::hash(set.slice(range))
    }

    /// Hash of the empty set.
    pub fn empty() -> Blake3Hash {
        RangeDigest::new().finish()
    }
}
