//! # Extent Index
//!
//! Ordered container of extents keyed by their first virtual page number.
//! Ranges are disjoint, so ordering by first vpn is ordering by range.

use crate::extent::{Extent, ExtentId};
use crate::page::PageRecord;
use crate::{ExtentError, ExtentResult};
use alloc::collections::BTreeMap;
use core::ops::Bound::{Excluded, Unbounded};

/// Where a page number lands relative to the indexed extents
///
/// Produced by [`ExtentIndex::find_insertion_point`]. Only valid until the
/// index is next mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// The page number that was searched for
    pub vpn: u64,
    /// First vpn of the nearest extent starting at or below `vpn`
    pub below: Option<u64>,
    /// First vpn of the nearest extent starting above `vpn`
    pub above: Option<u64>,
}

/// Extent index
#[derive(Debug, Clone, Default)]
pub struct ExtentIndex {
    /// Extents by first vpn
    extents: BTreeMap<u64, Extent>,
}

impl ExtentIndex {
    /// Create an empty index
    pub const fn new() -> Self {
        Self {
            extents: BTreeMap::new(),
        }
    }

    /// Number of extents
    pub fn len(&self) -> usize {
        self.extents.len()
    }

    /// Check if the index holds no extents
    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    /// Iterate over extents in ascending vpn order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Extent> + ExactSizeIterator + '_ {
        self.extents.values()
    }

    /// Get the extent starting at `first_vpn`
    pub fn get(&self, first_vpn: u64) -> Option<&Extent> {
        self.extents.get(&first_vpn)
    }

    /// Mutable access for changes that keep the first page in place
    pub(crate) fn get_mut(&mut self, first_vpn: u64) -> Option<&mut Extent> {
        self.extents.get_mut(&first_vpn)
    }

    /// Locate `vpn` among the indexed ranges
    ///
    /// Returns the extent whose range contains `vpn`, if any, together with
    /// the neighbors that bracket it.
    pub fn find_insertion_point(&self, vpn: u64) -> (Option<&Extent>, Position) {
        let below = self.extents.range(..=vpn).next_back();
        let above = self.extents.range((Excluded(vpn), Unbounded)).next();

        let position = Position {
            vpn,
            below: below.map(|(&key, _)| key),
            above: above.map(|(&key, _)| key),
        };

        let matched = below
            .map(|(_, extent)| extent)
            .filter(|extent| extent.contains_vpn(vpn));

        (matched, position)
    }

    /// The extent with the next-lower range
    pub fn predecessor(&self, extent: &Extent) -> Option<&Extent> {
        let first = extent.first()?.vpn();
        self.extents.range(..first).next_back().map(|(_, e)| e)
    }

    /// The extent with the next-higher range
    pub fn successor(&self, extent: &Extent) -> Option<&Extent> {
        let last = extent.last()?.vpn();
        self.extents
            .range((Excluded(last), Unbounded))
            .next()
            .map(|(_, e)| e)
    }

    /// Link a fully built extent into the index
    ///
    /// `position` must come from a search made since the last mutation and
    /// the extent must fit between its neighbors.
    pub fn insert_new(&mut self, extent: Extent, position: Position) -> ExtentResult<()> {
        let first = extent
            .first()
            .ok_or(ExtentError::Corrupted("empty extent linked into index"))?;
        let key = first.vpn();

        debug_assert!(position.below.map_or(true, |below| below < key));
        debug_assert!(position.above.map_or(true, |above| above > key));

        if self.extents.contains_key(&key) {
            return Err(ExtentError::Corrupted("duplicate extent key"));
        }

        self.extents.insert(key, extent);
        Ok(())
    }

    /// Unlink the extent starting at `first_vpn`
    pub fn remove(&mut self, first_vpn: u64) -> Option<Extent> {
        self.extents.remove(&first_vpn)
    }

    /// Prepend `page` to the extent starting at `first_vpn` and re-key it
    ///
    /// The caller has checked that the extent accepts `page` as its head.
    pub(crate) fn prepend_page(&mut self, first_vpn: u64, page: PageRecord) -> Option<ExtentId> {
        let mut extent = self.extents.remove(&first_vpn)?;
        extent.prepend_head(page);
        let id = extent.id();
        self.extents.insert(page.vpn(), extent);
        Some(id)
    }

    /// Append `page` to the extent at `tail`, then fold the extent at `head`
    /// into it
    ///
    /// Returns the surviving and the absorbed extent IDs. The caller has
    /// checked that `page` closes the gap between the two.
    pub(crate) fn bridge(
        &mut self,
        tail: u64,
        page: PageRecord,
        head: u64,
    ) -> Option<(ExtentId, ExtentId)> {
        let donor = self.extents.remove(&head)?;
        let Some(survivor) = self.extents.get_mut(&tail) else {
            self.extents.insert(head, donor);
            return None;
        };

        let absorbed = donor.id();
        survivor.append_tail(page);
        survivor.absorb_tail(donor);
        Some((survivor.id(), absorbed))
    }

    /// Verify ordering, disjointness and that no two neighbors could merge
    pub fn check(&self) -> ExtentResult<()> {
        let mut prev: Option<&Extent> = None;

        for (&key, extent) in &self.extents {
            extent.check()?;

            let first = extent
                .first()
                .ok_or(ExtentError::Corrupted("empty extent in index"))?;
            if first.vpn() != key {
                return Err(ExtentError::Corrupted("extent key differs from first vpn"));
            }

            if let Some(prev) = prev {
                let prev_last = prev
                    .last()
                    .ok_or(ExtentError::Corrupted("empty extent in index"))?;
                if prev_last.vpn() >= first.vpn() {
                    return Err(ExtentError::Corrupted("extent ranges overlap"));
                }
                if prev.abuts(extent) {
                    return Err(ExtentError::Corrupted("adjacent extents were not merged"));
                }
            }

            prev = Some(extent);
        }

        Ok(())
    }
}
