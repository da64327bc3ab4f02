//! # Tracker Statistics
//!
//! Read-only aggregation over the extent index. Nothing here mutates the
//! tracker; output goes through the `log` facade.

use crate::allocator::RecordAllocator;
use crate::extent::ExtentDescriptor;
use crate::tracker::ExtentTracker;

/// Tracker statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Pages across all extents
    pub total_pages: usize,
    /// Number of extents
    pub extent_count: usize,
    /// Pages in the largest extent
    pub largest_extent: usize,
    /// Bytes covered by all extents, saturating at `u64::MAX`
    pub total_bytes: u64,
}

impl TrackerStats {
    /// Walk the index in order and aggregate
    pub fn collect<A: RecordAllocator>(tracker: &ExtentTracker<A>) -> Self {
        let page_shift = tracker.config().page_shift();

        tracker.extents().fold(Self::default(), |mut stats, extent| {
            stats.total_pages += extent.page_count();
            stats.extent_count += 1;
            stats.largest_extent = stats.largest_extent.max(extent.page_count());
            stats.total_bytes = stats.total_bytes.saturating_add(extent.size_bytes(page_shift));
            stats
        })
    }

    /// Average pages per extent
    pub fn average_extent(&self) -> usize {
        if self.extent_count == 0 {
            0
        } else {
            self.total_pages / self.extent_count
        }
    }
}

/// Count pages and extents in one in-order pass
pub fn total_pages_and_extents<A: RecordAllocator>(tracker: &ExtentTracker<A>) -> (usize, usize) {
    let stats = TrackerStats::collect(tracker);
    (stats.total_pages, stats.extent_count)
}

/// Descriptors of every extent in ascending vpn order
pub fn describe_all<A: RecordAllocator>(
    tracker: &ExtentTracker<A>,
) -> impl Iterator<Item = ExtentDescriptor> + '_ {
    tracker.extents().filter_map(|extent| extent.describe())
}

/// Log one line per extent and a totals line
pub fn report<A: RecordAllocator>(tracker: &ExtentTracker<A>) {
    for desc in describe_all(tracker) {
        log::info!("{}", desc);
    }

    let stats = TrackerStats::collect(tracker);
    log::info!(
        "total pages: {}, total extents: {}",
        stats.total_pages,
        stats.extent_count
    );
}
