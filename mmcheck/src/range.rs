//! Page-granular address ranges.
//!
//! The memory manager logs byte addresses. Ranges are tracked in units of
//! 4 KiB pages, so every address is shifted right by [`PAGE_SHIFT`] before a
//! [`PageRange`] is built.

use std::cmp::Ordering;
use std::fmt;

/// Number of bits to drop from a byte address to obtain its page index.
pub const PAGE_SHIFT: u32 = 12;

/// Converts a byte address into a page index.
pub const fn page_of(address: u64) -> u64 {
    address >> PAGE_SHIFT
}

/// Half-open interval `[start, end)` of page indices.
///
/// Two ranges are equal iff both bounds are equal. `start < end` is expected
/// for ranges coming from the log, but it is not enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRange {
    pub start: u64,
    pub end: u64,
}

impl PageRange {
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Builds a range from the byte addresses printed by the memory manager.
    pub const fn from_addresses(start: u64, end: u64) -> Self {
        Self::new(page_of(start), page_of(end))
    }

    /// Checks whether two ranges share at least one page.
    ///
    /// Two ranges [a1,a2) and [b1,b2) overlap if: a1 < b2 && b1 < a2
    pub fn overlaps(&self, other: &PageRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}-{:04x}", self.start, self.end)
    }
}

/// Ranges are ordered by start page, then by end page.
impl Ord for PageRange {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.end.cmp(&other.end))
    }
}

impl PartialOrd for PageRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
