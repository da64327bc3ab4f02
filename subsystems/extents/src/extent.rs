//! # Extents
//!
//! An extent is an ordered run of pages where each page follows the previous
//! one by exactly one page in both address spaces.

use crate::page::PageRecord;
use crate::{ExtentError, ExtentResult, RecordKind};
use alloc::collections::VecDeque;
use core::ops::RangeInclusive;

/// Extent identifier
///
/// Handed out by the owning tracker, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtentId(u64);

impl ExtentId {
    /// Create from raw value
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for ExtentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only projection of an extent for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentDescriptor {
    /// Extent ID
    pub id: ExtentId,
    /// Number of pages
    pub page_count: usize,
    /// First virtual page number
    pub first_vpn: u64,
    /// First physical page number
    pub first_ppn: u64,
    /// Last virtual page number
    pub last_vpn: u64,
    /// Last physical page number
    pub last_ppn: u64,
}

impl core::fmt::Display for ExtentDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "extent {}: {},{} -> {},{} ({} pages)",
            self.id, self.first_vpn, self.first_ppn, self.last_vpn, self.last_ppn, self.page_count
        )
    }
}

/// A run of virtually and physically contiguous pages
#[derive(Debug, Clone)]
pub struct Extent {
    /// Extent ID
    id: ExtentId,
    /// Pages, ascending by vpn
    pages: VecDeque<PageRecord>,
    /// Cached first page
    first: Option<PageRecord>,
    /// Cached last page
    last: Option<PageRecord>,
}

impl Extent {
    /// Create an empty extent
    pub const fn new(id: ExtentId) -> Self {
        Self {
            id,
            pages: VecDeque::new(),
            first: None,
            last: None,
        }
    }

    /// Get the extent ID
    pub fn id(&self) -> ExtentId {
        self.id
    }

    /// Number of pages in the extent
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Check if the extent holds no pages
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Lowest page
    pub fn first(&self) -> Option<PageRecord> {
        self.first
    }

    /// Highest page
    pub fn last(&self) -> Option<PageRecord> {
        self.last
    }

    /// Virtual page range covered by the extent
    pub fn vpn_range(&self) -> Option<RangeInclusive<u64>> {
        Some(self.first?.vpn()..=self.last?.vpn())
    }

    /// Check if `vpn` falls inside the extent
    pub fn contains_vpn(&self, vpn: u64) -> bool {
        self.vpn_range().is_some_and(|range| range.contains(&vpn))
    }

    /// Iterate over the pages in ascending order
    pub fn pages(&self) -> impl DoubleEndedIterator<Item = &PageRecord> + ExactSizeIterator + '_ {
        self.pages.iter()
    }

    /// Size of the extent in bytes for the given page shift
    pub fn size_bytes(&self, page_shift: u32) -> u64 {
        let pages = self.pages.len() as u64;
        match 1u64.checked_shl(page_shift) {
            Some(page_size) => pages.saturating_mul(page_size),
            None if pages == 0 => 0,
            None => u64::MAX,
        }
    }

    /// Check if `page` can go directly in front of the first page
    pub fn accepts_head(&self, page: &PageRecord) -> bool {
        self.first.is_some_and(|first| page.is_followed_by(&first))
    }

    /// Check if `page` can go directly after the last page
    pub fn accepts_tail(&self, page: &PageRecord) -> bool {
        self.last.is_some_and(|last| last.is_followed_by(page))
    }

    /// Check if `next` starts exactly where this extent ends
    pub fn abuts(&self, next: &Extent) -> bool {
        match (self.last, next.first) {
            (Some(last), Some(first)) => last.is_followed_by(&first),
            _ => false,
        }
    }

    /// Make room for `additional` pages without touching the contents
    pub fn reserve(&mut self, additional: usize) -> ExtentResult<()> {
        self.pages
            .try_reserve(additional)
            .map_err(|_| ExtentError::OutOfMemory { kind: RecordKind::Page })
    }

    /// Insert `page` before all existing pages
    ///
    /// The caller guarantees `page` directly precedes the current first page,
    /// or that the extent is empty.
    pub fn prepend_head(&mut self, page: PageRecord) {
        debug_assert!(self.is_empty() || self.accepts_head(&page));

        self.pages.push_front(page);
        self.first = Some(page);
        if self.last.is_none() {
            self.last = Some(page);
        }
    }

    /// Insert `page` after all existing pages
    ///
    /// The caller guarantees `page` directly follows the current last page,
    /// or that the extent is empty.
    pub fn append_tail(&mut self, page: PageRecord) {
        debug_assert!(self.is_empty() || self.accepts_tail(&page));

        self.pages.push_back(page);
        self.last = Some(page);
        if self.first.is_none() {
            self.first = Some(page);
        }
    }

    /// Move every page of `other` onto the tail of this extent
    ///
    /// `other` is consumed; its ID is discarded.
    pub fn absorb_tail(&mut self, mut other: Extent) {
        debug_assert!(self.abuts(&other));

        self.pages.append(&mut other.pages);
        self.last = other.last;
        if self.first.is_none() {
            self.first = other.first;
        }
    }

    /// Project the extent for reporting
    ///
    /// Empty extents have nothing to describe.
    pub fn describe(&self) -> Option<ExtentDescriptor> {
        let first = self.first?;
        let last = self.last?;
        Some(ExtentDescriptor {
            id: self.id,
            page_count: self.pages.len(),
            first_vpn: first.vpn(),
            first_ppn: first.ppn(),
            last_vpn: last.vpn(),
            last_ppn: last.ppn(),
        })
    }

    /// Verify the cached bounds and page contiguity
    pub fn check(&self) -> ExtentResult<()> {
        if self.first != self.pages.front().copied() {
            return Err(ExtentError::Corrupted("cached first page is stale"));
        }
        if self.last != self.pages.back().copied() {
            return Err(ExtentError::Corrupted("cached last page is stale"));
        }

        let mut pages = self.pages.iter();
        if let Some(mut prev) = pages.next() {
            for page in pages {
                if !prev.is_followed_by(page) {
                    return Err(ExtentError::Corrupted("pages within an extent are not contiguous"));
                }
                prev = page;
            }
        }

        Ok(())
    }
}
