//! Half-open index ranges for data-parallel splitting.

use std::ops::Range;

/// A half-open interval `[lo, hi)` of indices.
///
/// Immutable once created; [`split`](IndexRange::split) produces two
/// disjoint sub-ranges whose union is the original.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexRange {
    pub lo: usize,
    pub hi: usize,
}

impl IndexRange {
    /// Create a range.
    ///
    /// # Panics
    /// Panics if `lo > hi`.
    #[inline]
    pub fn new(lo: usize, hi: usize) -> Self {
        assert!(lo <= hi, "invalid range: lo {} > hi {}", lo, hi);
        Self { lo, hi }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.hi - self.lo
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lo == self.hi
    }

    /// Split at the index-count midpoint.
    ///
    /// Both halves are non-empty, disjoint, and cover `self` exactly.
    ///
    /// # Panics
    /// Panics if the range has fewer than 2 indices; splitting such a range
    /// would return an empty half and invite infinite recursion.
    #[inline]
    pub fn split(self) -> (Self, Self) {
        assert!(self.len() >= 2, "cannot split a range of len < 2");
        let mid = self.lo + self.len() / 2;
        (
            Self {
                lo: self.lo,
                hi: mid,
            },
            Self {
                lo: mid,
                hi: self.hi,
            },
        )
    }
}

impl IntoIterator for IndexRange {
    type Item = usize;
    type IntoIter = Range<usize>;

    #[inline]
    fn into_iter(self) -> Range<usize> {
        self.lo..self.hi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_partitions_exactly() {
        for len in 2..64usize {
            let r = IndexRange::new(10, 10 + len);
            let (a, b) = r.split();
            assert!(!a.is_empty());
            assert!(!b.is_empty());
            assert_eq!(a.hi, b.lo);
            assert_eq!(a.lo, r.lo);
            assert_eq!(b.hi, r.hi);
            assert_eq!(a.len() + b.len(), r.len());
            // Halves differ by at most one index.
            assert!(a.len().abs_diff(b.len()) <= 1);
        }
    }

    #[test]
    fn iteration_covers_range() {
        let r = IndexRange::new(3, 7);
        let seen: Vec<usize> = r.into_iter().collect();
        assert_eq!(seen, vec![3, 4, 5, 6]);
        assert!(IndexRange::new(5, 5).into_iter().next().is_none());
    }

    #[test]
    #[should_panic(expected = "invalid range")]
    fn inverted_bounds_rejected() {
        IndexRange::new(4, 3);
    }

    #[test]
    #[should_panic(expected = "cannot split")]
    fn single_index_range_cannot_split() {
        IndexRange::new(3, 4).split();
    }

    #[test]
    #[should_panic(expected = "cannot split")]
    fn empty_range_cannot_split() {
        IndexRange::new(5, 5).split();
    }
}
