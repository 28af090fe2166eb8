//! Free-space ledger: offset-sorted, always-coalesced byte ranges.
//!
//! Two invariants hold at every quiescent point:
//! - ranges are sorted by offset and never overlap
//! - no two ranges are adjacent (contiguous neighbors merge on release)
//!
//! Allocation is first-fit: the lowest-offset range that fits wins, and any
//! leftover tail of that range stays free.  Callers that run out of space
//! extend the file and release the new tail, which coalesces with a
//! trailing free range automatically.

// ── FreeRange ────────────────────────────────────────────────────────────────

/// One reusable byte range inside the collection file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeRange {
    pub offset: u64,
    pub length: u64,
}

impl FreeRange {
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

// ── FreeList ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct FreeList {
    ranges: Vec<FreeRange>,
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of disjoint free ranges.
    #[inline]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total reusable bytes.
    pub fn free_bytes(&self) -> u64 {
        self.ranges.iter().map(|r| r.length).sum()
    }

    /// The ranges, sorted by offset.
    pub fn ranges(&self) -> &[FreeRange] {
        &self.ranges
    }

    /// Return `(offset, length)` bytes to the free pool, merging with the
    /// immediate neighbors when contiguous.
    ///
    /// Zero-length releases are ignored.  Releasing a range that overlaps
    /// an existing one is a caller bug; debug builds assert on it.
    pub fn release(&mut self, offset: u64, length: u64) {
        if length == 0 {
            return;
        }
        let idx = self.ranges.partition_point(|r| r.offset < offset);

        debug_assert!(
            idx == 0 || self.ranges[idx - 1].end() <= offset,
            "released range overlaps predecessor"
        );
        debug_assert!(
            idx == self.ranges.len() || offset + length <= self.ranges[idx].offset,
            "released range overlaps successor"
        );

        let merges_prev = idx > 0 && self.ranges[idx - 1].end() == offset;
        let merges_next = idx < self.ranges.len() && offset + length == self.ranges[idx].offset;

        match (merges_prev, merges_next) {
            (true, true) => {
                self.ranges[idx - 1].length += length + self.ranges[idx].length;
                self.ranges.remove(idx);
            }
            (true, false) => self.ranges[idx - 1].length += length,
            (false, true) => {
                self.ranges[idx].offset = offset;
                self.ranges[idx].length += length;
            }
            (false, false) => self.ranges.insert(idx, FreeRange { offset, length }),
        }
    }

    /// First-fit allocation.  Returns the offset of a `size`-byte region, or
    /// `None` when no single range fits; the leftover of the chosen range
    /// stays free.
    pub fn allocate(&mut self, size: u64) -> Option<u64> {
        let idx = self.ranges.iter().position(|r| r.length >= size)?;
        let offset = self.ranges[idx].offset;
        if self.ranges[idx].length == size {
            self.ranges.remove(idx);
        } else {
            self.ranges[idx].offset += size;
            self.ranges[idx].length -= size;
        }
        Some(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(fl: &FreeList) -> Vec<(u64, u64)> {
        fl.ranges().iter().map(|r| (r.offset, r.length)).collect()
    }

    #[test]
    fn release_coalesces_only_contiguous_neighbors() {
        // (0,10), (15,5), (20,5) in any order: (15,5)+(20,5) touch and merge,
        // (0,10) stays apart because of the 10..15 gap.
        let orders: [[(u64, u64); 3]; 3] = [
            [(0, 10), (15, 5), (20, 5)],
            [(20, 5), (0, 10), (15, 5)],
            [(15, 5), (20, 5), (0, 10)],
        ];
        for order in orders {
            let mut fl = FreeList::new();
            for (off, len) in order {
                fl.release(off, len);
            }
            assert_eq!(ranges(&fl), vec![(0, 10), (15, 10)], "order {order:?}");
        }
    }

    #[test]
    fn release_bridges_a_gap() {
        let mut fl = FreeList::new();
        fl.release(0, 10);
        fl.release(20, 10);
        fl.release(10, 10);
        assert_eq!(ranges(&fl), vec![(0, 30)]);
    }

    #[test]
    fn first_fit_prefers_lowest_offset() {
        let mut fl = FreeList::new();
        fl.release(100, 50);
        fl.release(0, 20);
        assert_eq!(fl.allocate(10), Some(0));
        // Leftover of the first range survives.
        assert_eq!(ranges(&fl), vec![(10, 10), (100, 50)]);
        // 10 bytes no longer fit 30; skip to the second range.
        assert_eq!(fl.allocate(30), Some(100));
        assert_eq!(ranges(&fl), vec![(10, 10), (130, 20)]);
    }

    #[test]
    fn exact_fit_removes_the_range() {
        let mut fl = FreeList::new();
        fl.release(40, 8);
        assert_eq!(fl.allocate(8), Some(40));
        assert!(fl.is_empty());
        assert_eq!(fl.allocate(1), None);
    }

    #[test]
    fn free_bytes_tracks_releases_and_allocations() {
        let mut fl = FreeList::new();
        fl.release(0, 100);
        fl.release(200, 50);
        assert_eq!(fl.free_bytes(), 150);
        fl.allocate(60).unwrap();
        assert_eq!(fl.free_bytes(), 90);
    }
}
