//! Half-open spans of the object key space.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-open range `[from, to)` over object keys.
///
/// `from >= to` denotes the empty range.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub from: u64,
    pub to: u64,
}

impl Range {
    /// The sentinel range spanning the entire key space.
    pub const WHOLE: Self = Self {
        from: 0,
        to: u64::MAX,
    };

    /// Create a range.
    pub const fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Whether this is exactly the whole-space sentinel.
    pub const fn is_whole_space(&self) -> bool {
        self.from == 0 && self.to == u64::MAX
    }

    /// Whether the range contains no keys.
    pub const fn is_empty(&self) -> bool {
        self.from >= self.to
    }

    /// Number of keys spanned.
    pub const fn width(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.to - self.from
        }
    }

    /// Whether `key` falls inside the range.
    pub const fn contains(&self, key: u64) -> bool {
        key >= self.from && key < self.to
    }

    /// Split into at most `parts` contiguous sub-ranges of near-equal width.
    ///
    /// The result covers this range exactly, in key order. Ranges narrower
    /// than `parts` split into single-key ranges; the empty range yields
    /// nothing.
    pub fn split(&self, parts: u64) -> Vec<Range> {
        let width = self.width();
        if width == 0 || parts == 0 {
            return Vec::new();
        }
        let parts = parts.min(width);
        let step = width / parts;
        let remainder = width % parts;

        let mut out = Vec::with_capacity(parts as usize);
        let mut from = self.from;
        for i in 0..parts {
            // Spread the remainder over the leading sub-ranges.
            let len = step + u64::from(i < remainder);
            let to = from + len;
            out.push(Range::new(from, to));
            from = to;
        }
        out
    }
}

impl fmt::Debug for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.from, self.to)
    }
}
