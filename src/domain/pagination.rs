//! Offset pagination over a fixed-size record range.
//!
//! Responsibility:
//! - page offsets for `[start, total)` in steps of the page size
//! - grouping of offsets into bursts
//! - per-offset outcome markers and the missing/failed scan

use std::collections::BTreeMap;

/// Half-open record range `[start, total)` walked in `page_size` steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    start: u64,
    total: u64,
    page_size: u64,
}

impl PageRange {
    /// `page_size` must be non-zero.
    pub fn new(start: u64, total: u64, page_size: u64) -> Option<Self> {
        (page_size > 0).then_some(Self {
            start,
            total,
            page_size,
        })
    }

    pub const fn start(&self) -> u64 {
        self.start
    }

    pub const fn total(&self) -> u64 {
        self.total
    }

    pub const fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Number of pages needed to cover the range (0 when `start >= total`)
    pub const fn pending_pages(&self) -> u64 {
        self.total.saturating_sub(self.start).div_ceil(self.page_size)
    }

    /// Offsets `start, start + page_size, ...` strictly below `total`, produced lazily
    pub fn offsets(&self) -> PageOffsets {
        PageOffsets {
            next: self.start,
            total: self.total,
            step: self.page_size,
        }
    }

    /// Offsets grouped into bursts of at most `burst_limit` pages.
    ///
    /// The effective burst size never exceeds the number of pending pages and
    /// is at least one.
    pub fn bursts(&self, burst_limit: usize) -> Bursts {
        let pending = usize::try_from(self.pending_pages()).unwrap_or(usize::MAX);
        let size = burst_limit.min(pending).max(1);
        Bursts {
            offsets: self.offsets(),
            size,
        }
    }

    pub fn burst_count(&self, burst_limit: usize) -> u64 {
        let pending = self.pending_pages();
        let size = (burst_limit as u64).min(pending).max(1);
        pending.div_ceil(size)
    }
}

#[derive(Debug, Clone)]
pub struct PageOffsets {
    next: u64,
    total: u64,
    step: u64,
}

impl Iterator for PageOffsets {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.next >= self.total {
            return None;
        }
        let current = self.next;
        self.next = self.next.saturating_add(self.step);
        Some(current)
    }
}

#[derive(Debug, Clone)]
pub struct Bursts {
    offsets: PageOffsets,
    size: usize,
}

impl Iterator for Bursts {
    type Item = Vec<u64>;

    fn next(&mut self) -> Option<Vec<u64>> {
        let burst: Vec<u64> = self.offsets.by_ref().take(self.size).collect();
        (!burst.is_empty()).then_some(burst)
    }
}

/// Outcome of a scheduled page fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    /// Scheduled, result not in yet
    Pending,
    Succeeded,
    Failed,
}

/// Offset -> outcome bookkeeping for one credential slice.
///
/// An offset absent from the table was never scheduled.
#[derive(Debug, Clone, Default)]
pub struct OffsetMarkerTable {
    markers: BTreeMap<u64, MarkerState>,
}

impl OffsetMarkerTable {
    pub fn schedule(&mut self, offset: u64) {
        self.markers.insert(offset, MarkerState::Pending);
    }

    pub fn succeed(&mut self, offset: u64) {
        self.markers.insert(offset, MarkerState::Succeeded);
    }

    pub fn fail(&mut self, offset: u64) {
        self.markers.insert(offset, MarkerState::Failed);
    }

    pub fn state(&self, offset: u64) -> Option<MarkerState> {
        self.markers.get(&offset).copied()
    }

    pub fn has_failures(&self) -> bool {
        self.markers.values().any(|s| *s == MarkerState::Failed)
    }

    pub fn count(&self, state: MarkerState) -> usize {
        self.markers.values().filter(|s| **s == state).count()
    }

    /// Every offset of `range` that is not marked succeeded, in ascending order.
    ///
    /// Pending offsets count as missing: a result that never arrived is
    /// indistinguishable from a failure.
    pub fn missing_or_failed(&self, range: &PageRange) -> Vec<u64> {
        range
            .offsets()
            .filter(|offset| self.state(*offset) != Some(MarkerState::Succeeded))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn offsets_cover_range_in_page_steps() {
        let range = PageRange::new(0, 120, 50).unwrap();
        assert_eq!(range.offsets().collect::<Vec<_>>(), vec![0, 50, 100]);
        assert_eq!(range.pending_pages(), 3);
    }

    #[test]
    fn start_at_or_past_total_yields_nothing() {
        let range = PageRange::new(200, 200, 50).unwrap();
        assert_eq!(range.pending_pages(), 0);
        assert_eq!(range.offsets().count(), 0);
        assert_eq!(range.bursts(10).count(), 0);
        assert!(PageRange::new(0, 10, 0).is_none());
    }

    #[test]
    fn burst_size_shrinks_to_pending_pages() {
        let range = PageRange::new(0, 150, 50).unwrap();
        let bursts: Vec<_> = range.bursts(238).collect();
        assert_eq!(bursts, vec![vec![0, 50, 100]]);
        assert_eq!(range.burst_count(238), 1);
    }

    #[test]
    fn bursts_split_offsets() {
        let range = PageRange::new(100, 400, 50).unwrap();
        let bursts: Vec<_> = range.bursts(2).collect();
        assert_eq!(bursts, vec![vec![100, 150], vec![200, 250], vec![300, 350]]);
        assert_eq!(range.burst_count(2), 3);
    }

    #[test]
    fn markers_report_missing_and_failed() {
        let range = PageRange::new(0, 250, 50).unwrap();
        let mut markers = OffsetMarkerTable::default();
        markers.schedule(0);
        markers.succeed(0);
        markers.schedule(50);
        markers.fail(50);
        markers.schedule(100);
        markers.succeed(150);
        assert!(markers.has_failures());
        assert_eq!(markers.missing_or_failed(&range), vec![50, 100, 200]);
        assert_eq!(markers.count(MarkerState::Succeeded), 2);
    }

    proptest! {
        #[test]
        fn bursts_partition_offsets(
            start in 0u64..500,
            len in 0u64..5_000,
            page in 1u64..200,
            burst in 1usize..50,
        ) {
            let range = PageRange::new(start, start + len, page).unwrap();
            let flattened: Vec<u64> = range.bursts(burst).flatten().collect();
            let direct: Vec<u64> = range.offsets().collect();
            prop_assert_eq!(flattened.len() as u64, range.pending_pages());
            prop_assert_eq!(flattened, direct);
            prop_assert_eq!(range.bursts(burst).count() as u64, range.burst_count(burst));
        }
    }
}
