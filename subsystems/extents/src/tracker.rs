//! # Extent Tracker
//!
//! Owns the extent index and turns a stream of page records into the
//! smallest set of extents covering them.
//!
//! ## Insert
//!
//! Every insert runs in three phases:
//!
//! 1. **Plan**: locate the page among the indexed ranges (read-only) and
//!    decide whether it extends the extent below it, the extent above it,
//!    bridges both, or starts a new extent.
//! 2. **Charge**: obtain every allocation the plan needs (page record,
//!    extent header, page capacity). A refusal here refunds what was already
//!    granted and returns [`ExtentError::OutOfMemory`] with the index
//!    untouched.
//! 3. **Apply**: link the page into the index. Starts only after the last
//!    fallible step.
//!
//! When a page bridges two extents the lower one survives, keeps its ID and
//! absorbs the upper one.

use crate::allocator::{GlobalRecords, RecordAllocator, RecordKind};
use crate::config::{TrackerConfig, TrackerFlags};
use crate::extent::{Extent, ExtentId};
use crate::index::{ExtentIndex, Position};
use crate::page::PageRecord;
use crate::stats::TrackerStats;
use crate::{ExtentError, ExtentResult};

const STALE_PLAN: ExtentError = ExtentError::Corrupted("extent vanished between plan and apply");

/// What an insert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new single-page extent was created
    Created(ExtentId),
    /// The page became the new first page of an extent
    Prepended(ExtentId),
    /// The page became the new last page of an extent
    Appended(ExtentId),
    /// The page closed the gap between two extents
    Merged {
        /// Extent that now spans both
        survivor: ExtentId,
        /// Extent that was folded in and discarded
        absorbed: ExtentId,
    },
}

impl InsertOutcome {
    /// Extent that holds the page after the insert
    pub fn extent(&self) -> ExtentId {
        match *self {
            Self::Created(id) | Self::Prepended(id) | Self::Appended(id) => id,
            Self::Merged { survivor, .. } => survivor,
        }
    }
}

/// Decision taken by the read-only phase of an insert
#[derive(Debug, Clone, Copy)]
enum Plan {
    /// Start a new extent at `position`
    Create(Position),
    /// Extend the extent keyed `head` downwards
    Prepend { head: u64 },
    /// Extend the extent keyed `tail` upwards
    Append { tail: u64 },
    /// Extend `tail` upwards and fold `head` into it
    Bridge { tail: u64, head: u64, absorbed_pages: usize },
}

/// Extent tracker
///
/// Not internally synchronized. Shared trackers live behind
/// [`ExtentTree`](crate::lock::ExtentTree); `&mut self` on [`insert`](Self::insert)
/// is only reachable through its lock guard.
#[derive(Debug)]
pub struct ExtentTracker<A: RecordAllocator = GlobalRecords> {
    /// Extents ordered by range
    index: ExtentIndex,
    /// ID for the next created extent
    next_id: u64,
    /// Successful inserts so far
    inserted: u64,
    /// Configuration
    config: TrackerConfig,
    /// Record allocator
    allocator: A,
}

impl ExtentTracker<GlobalRecords> {
    /// Create an empty tracker on the global heap
    pub const fn new() -> Self {
        Self::with_allocator(GlobalRecords::new())
    }
}

impl Default for ExtentTracker<GlobalRecords> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: RecordAllocator> ExtentTracker<A> {
    /// Create an empty tracker drawing records from `allocator`
    pub const fn with_allocator(allocator: A) -> Self {
        Self {
            index: ExtentIndex::new(),
            next_id: 0,
            inserted: 0,
            config: TrackerConfig::new(),
            allocator,
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Get the record allocator
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Get the extent index
    pub fn index(&self) -> &ExtentIndex {
        &self.index
    }

    /// Number of extents
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if no page has been tracked yet
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of pages tracked
    pub fn total_pages(&self) -> u64 {
        self.inserted
    }

    /// Iterate over extents in ascending vpn order
    pub fn extents(&self) -> impl DoubleEndedIterator<Item = &Extent> + ExactSizeIterator + '_ {
        self.index.iter()
    }

    /// Aggregate page and extent counts
    pub fn snapshot_stats(&self) -> TrackerStats {
        TrackerStats::collect(self)
    }

    /// Track the mapping `vpn -> ppn`
    pub fn insert(&mut self, vpn: u64, ppn: u64) -> ExtentResult<InsertOutcome> {
        self.insert_page(PageRecord::new(vpn, ppn))
    }

    /// Track the mapping between two page-aligned addresses
    pub fn insert_addresses(&mut self, virt: u64, phys: u64) -> ExtentResult<InsertOutcome> {
        let shift = self.config.page_shift();
        let page = PageRecord::from_addresses(virt, phys, shift).ok_or_else(|| {
            let mask = self.config.page_size() - 1;
            ExtentError::Misaligned {
                addr: if virt & mask != 0 { virt } else { phys },
            }
        })?;
        self.insert_page(page)
    }

    /// Track a page record
    ///
    /// On error the tracker is exactly as it was before the call, with one
    /// exception: under [`TrackerFlags::VERIFY`] a [`ExtentError::Corrupted`]
    /// from the post-insert check is returned after the page was linked.
    pub fn insert_page(&mut self, page: PageRecord) -> ExtentResult<InsertOutcome> {
        let plan = self.plan(&page).map_err(|err| {
            log::warn!("rejecting page {},{}: {}", page.vpn(), page.ppn(), err);
            err
        })?;

        self.charge(RecordKind::Page)?;
        let outcome = match self.apply(page, plan) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.refund(RecordKind::Page);
                log::warn!("page {},{} not tracked: {}", page.vpn(), page.ppn(), err);
                return Err(err);
            }
        };
        self.inserted += 1;

        if self.config.has(TrackerFlags::TRACE_INSERTS) {
            log::trace!("page {},{} -> {:?}", page.vpn(), page.ppn(), outcome);
        }
        if self.config.has(TrackerFlags::VERIFY) {
            self.validate()?;
        }

        Ok(outcome)
    }

    /// Check every index invariant and that no page was lost
    pub fn validate(&self) -> ExtentResult<()> {
        self.index.check()?;

        let pages: u64 = self.index.iter().map(|e| e.page_count() as u64).sum();
        if pages != self.inserted {
            return Err(ExtentError::Corrupted("page count differs from inserts"));
        }
        if self.index.len() as u64 > self.next_id {
            return Err(ExtentError::Corrupted("more extents than IDs handed out"));
        }
        Ok(())
    }

    /// Decide where `page` goes without touching anything
    fn plan(&self, page: &PageRecord) -> ExtentResult<Plan> {
        let (matched, position) = self.index.find_insertion_point(page.vpn());
        if let Some(extent) = matched {
            return Err(ExtentError::Overlap {
                vpn: page.vpn(),
                extent: extent.id(),
            });
        }

        let below = position
            .below
            .and_then(|key| self.index.get(key))
            .filter(|extent| extent.accepts_tail(page));
        let above = position
            .above
            .and_then(|key| self.index.get(key))
            .filter(|extent| extent.accepts_head(page));

        let plan = match (position.below.zip(below), position.above.zip(above)) {
            (Some((tail, _)), Some((head, upper))) => Plan::Bridge {
                tail,
                head,
                absorbed_pages: upper.page_count(),
            },
            (Some((tail, _)), None) => Plan::Append { tail },
            (None, Some((head, _))) => Plan::Prepend { head },
            (None, None) => Plan::Create(position),
        };
        Ok(plan)
    }

    /// Carry out `plan`; every fallible step happens before the index changes
    fn apply(&mut self, page: PageRecord, plan: Plan) -> ExtentResult<InsertOutcome> {
        match plan {
            Plan::Create(position) => {
                self.charge(RecordKind::Extent)?;

                let mut extent = Extent::new(ExtentId::from_raw(self.next_id));
                if let Err(err) = extent.reserve(1) {
                    self.refund(RecordKind::Extent);
                    return Err(err);
                }
                extent.prepend_head(page);

                let id = extent.id();
                if let Err(err) = self.index.insert_new(extent, position) {
                    self.refund(RecordKind::Extent);
                    return Err(err);
                }
                self.next_id += 1;

                log::debug!("extent {} created at {},{}", id, page.vpn(), page.ppn());
                Ok(InsertOutcome::Created(id))
            }
            Plan::Prepend { head } => {
                self.index.get_mut(head).ok_or(STALE_PLAN)?.reserve(1)?;
                let id = self.index.prepend_page(head, page).ok_or(STALE_PLAN)?;
                Ok(InsertOutcome::Prepended(id))
            }
            Plan::Append { tail } => {
                let extent = self.index.get_mut(tail).ok_or(STALE_PLAN)?;
                extent.reserve(1)?;
                extent.append_tail(page);
                Ok(InsertOutcome::Appended(extent.id()))
            }
            Plan::Bridge {
                tail,
                head,
                absorbed_pages,
            } => {
                self.index
                    .get_mut(tail)
                    .ok_or(STALE_PLAN)?
                    .reserve(1 + absorbed_pages)?;
                let (survivor, absorbed) =
                    self.index.bridge(tail, page, head).ok_or(STALE_PLAN)?;
                self.refund(RecordKind::Extent);

                log::debug!(
                    "extent {} absorbed extent {} via page {},{}",
                    survivor,
                    absorbed,
                    page.vpn(),
                    page.ppn()
                );
                Ok(InsertOutcome::Merged { survivor, absorbed })
            }
        }
    }

    fn charge(&mut self, kind: RecordKind) -> ExtentResult<()> {
        self.allocator.allocate(kind, kind.layout()).map_err(|err| {
            log::warn!("{}: cannot allocate {:?} record", self.allocator.name(), kind);
            err
        })
    }

    fn refund(&mut self, kind: RecordKind) {
        self.allocator.release(kind, kind.layout());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::BudgetRecords;
    use alloc::vec::Vec;

    fn bounds(tracker: &ExtentTracker<impl RecordAllocator>) -> Vec<(u64, u64, u64, u64, usize)> {
        tracker
            .extents()
            .map(|e| {
                let d = e.describe().unwrap();
                (d.first_vpn, d.first_ppn, d.last_vpn, d.last_ppn, d.page_count)
            })
            .collect()
    }

    #[test]
    fn test_first_insert_creates_extent() {
        let mut tracker = ExtentTracker::new();
        let outcome = tracker.insert(5, 205).unwrap();

        assert_eq!(outcome, InsertOutcome::Created(ExtentId::from_raw(0)));
        assert_eq!(tracker.len(), 1);
        assert_eq!(bounds(&tracker), [(5, 205, 5, 205, 1)]);
    }

    #[test]
    fn test_append_then_prepend() {
        let mut tracker = ExtentTracker::new();
        tracker.insert(5, 205).unwrap();

        let id = ExtentId::from_raw(0);
        assert_eq!(tracker.insert(6, 206).unwrap(), InsertOutcome::Appended(id));
        assert_eq!(tracker.insert(4, 204).unwrap(), InsertOutcome::Prepended(id));

        assert_eq!(bounds(&tracker), [(4, 204, 6, 206, 3)]);
        assert!(tracker.validate().is_ok());
    }

    #[test]
    fn test_bridge_keeps_lower_id() {
        let mut tracker = ExtentTracker::new();
        tracker.insert(10, 10).unwrap();
        tracker.insert(12, 12).unwrap();

        let outcome = tracker.insert(11, 11).unwrap();
        assert_eq!(
            outcome,
            InsertOutcome::Merged {
                survivor: ExtentId::from_raw(0),
                absorbed: ExtentId::from_raw(1),
            }
        );
        assert_eq!(outcome.extent(), ExtentId::from_raw(0));
        assert_eq!(bounds(&tracker), [(10, 10, 12, 12, 3)]);
    }

    #[test]
    fn test_bridge_keeps_lower_id_when_upper_is_older() {
        let mut tracker = ExtentTracker::new();
        tracker.insert(12, 12).unwrap();
        tracker.insert(10, 10).unwrap();

        let outcome = tracker.insert(11, 11).unwrap();
        assert_eq!(
            outcome,
            InsertOutcome::Merged {
                survivor: ExtentId::from_raw(1),
                absorbed: ExtentId::from_raw(0),
            }
        );
        assert!(tracker.validate().is_ok());
    }

    #[test]
    fn test_virtual_neighbor_with_physical_gap_stays_separate() {
        let mut tracker = ExtentTracker::new();
        tracker.insert(0, 100).unwrap();

        let outcome = tracker.insert(1, 500).unwrap();
        assert_eq!(outcome, InsertOutcome::Created(ExtentId::from_raw(1)));
        assert_eq!(tracker.len(), 2);
        assert!(tracker.validate().is_ok());
    }

    #[test]
    fn test_single_sided_match_does_not_merge() {
        let mut tracker = ExtentTracker::new();
        tracker.insert(0, 0).unwrap();
        tracker.insert(2, 50).unwrap();

        // Continues the lower extent but not the upper one.
        let outcome = tracker.insert(1, 1).unwrap();
        assert_eq!(outcome, InsertOutcome::Appended(ExtentId::from_raw(0)));
        assert_eq!(bounds(&tracker), [(0, 0, 1, 1, 2), (2, 50, 2, 50, 1)]);
    }

    #[test]
    fn test_duplicate_is_rejected() {
        let mut tracker = ExtentTracker::new();
        tracker.insert(0, 0).unwrap();
        tracker.insert(1, 1).unwrap();

        assert_eq!(
            tracker.insert(1, 1),
            Err(ExtentError::Overlap {
                vpn: 1,
                extent: ExtentId::from_raw(0),
            })
        );
        assert_eq!(
            tracker.insert(0, 77),
            Err(ExtentError::Overlap {
                vpn: 0,
                extent: ExtentId::from_raw(0),
            })
        );
        assert_eq!(tracker.total_pages(), 2);
        assert!(tracker.validate().is_ok());
    }

    #[test]
    fn test_page_number_edges_do_not_wrap() {
        let mut tracker = ExtentTracker::new();
        tracker.insert(u64::MAX, u64::MAX).unwrap();
        tracker.insert(0, 0).unwrap();

        assert_eq!(tracker.len(), 2);
        assert_eq!(
            tracker.insert(u64::MAX - 1, u64::MAX - 1).unwrap(),
            InsertOutcome::Prepended(ExtentId::from_raw(0))
        );
        assert!(tracker.validate().is_ok());
    }

    #[test]
    fn test_insert_addresses() {
        let mut tracker = ExtentTracker::new();
        tracker.insert_addresses(0x1000, 0x8000_0000).unwrap();
        tracker.insert_addresses(0x2000, 0x8000_1000).unwrap();

        assert_eq!(bounds(&tracker), [(1, 0x8_0000, 2, 0x8_0001, 2)]);
        assert_eq!(
            tracker.insert_addresses(0x3000, 0x8000_2010),
            Err(ExtentError::Misaligned { addr: 0x8000_2010 })
        );
    }

    #[test]
    fn test_refused_page_leaves_tracker_untouched() {
        let mut tracker = ExtentTracker::with_allocator(BudgetRecords::new(2));
        tracker.insert(0, 0).unwrap();

        assert_eq!(
            tracker.insert(1, 1),
            Err(ExtentError::OutOfMemory { kind: RecordKind::Page })
        );
        assert_eq!(bounds(&tracker), [(0, 0, 0, 0, 1)]);
        assert_eq!(tracker.total_pages(), 1);
        assert!(tracker.validate().is_ok());
    }

    #[test]
    fn test_refused_extent_refunds_page() {
        let mut tracker = ExtentTracker::with_allocator(BudgetRecords::new(3));
        tracker.insert(0, 0).unwrap();

        // Needs a page and an extent but only one record is left.
        assert_eq!(
            tracker.insert(10, 10),
            Err(ExtentError::OutOfMemory { kind: RecordKind::Extent })
        );
        assert_eq!(tracker.allocator().remaining(), 1);
        assert_eq!(tracker.len(), 1);

        // The refunded record is still usable for an append.
        tracker.insert(1, 1).unwrap();
        assert_eq!(tracker.total_pages(), 2);
    }

    #[test]
    fn test_merge_returns_extent_record() {
        let mut tracker = ExtentTracker::new();
        tracker.insert(0, 0).unwrap();
        tracker.insert(2, 2).unwrap();
        tracker.insert(1, 1).unwrap();

        let stats = tracker.allocator().stats();
        assert_eq!(stats.live_extents(), 1);
        assert_eq!(stats.live_pages(), 3);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut tracker = ExtentTracker::new();
        tracker.insert(0, 0).unwrap();
        tracker.insert(2, 2).unwrap();
        tracker.insert(1, 1).unwrap();

        assert_eq!(
            tracker.insert(10, 10).unwrap(),
            InsertOutcome::Created(ExtentId::from_raw(2))
        );
    }

    #[test]
    fn test_verify_flag() {
        let mut tracker = ExtentTracker::new()
            .with_config(TrackerConfig::new().with_flags(TrackerFlags::DEBUG));

        for vpn in [3, 1, 5, 2, 4] {
            tracker.insert(vpn, vpn + 1000).unwrap();
        }
        assert_eq!(bounds(&tracker), [(1, 1001, 5, 1005, 5)]);
    }

    #[test]
    fn test_verify_reports_corruption_after_linking() {
        let mut tracker = ExtentTracker::new()
            .with_config(TrackerConfig::new().with_flags(TrackerFlags::VERIFY));
        tracker.insert(0, 0).unwrap();
        tracker.inserted += 1;

        assert_eq!(
            tracker.insert(1, 1),
            Err(ExtentError::Corrupted("page count differs from inserts"))
        );
        assert_eq!(bounds(&tracker), [(0, 0, 1, 1, 2)]);
        assert_eq!(tracker.total_pages(), 3);
    }

    #[test]
    fn test_insert_addresses_with_largest_page_shift() {
        let mut tracker = ExtentTracker::new()
            .with_config(TrackerConfig::new().with_page_shift(63));

        assert_eq!(
            tracker.insert_addresses(0x1000, 0),
            Err(ExtentError::Misaligned { addr: 0x1000 })
        );
        tracker.insert_addresses(1 << 63, 0).unwrap();
        assert_eq!(bounds(&tracker), [(1, 0, 1, 0, 1)]);
    }
}
