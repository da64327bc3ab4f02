//! # Record Allocator Framework
//!
//! The tracker asks a [`RecordAllocator`] before it creates a page record or
//! an extent. Refusal surfaces as [`ExtentError::OutOfMemory`] and leaves the
//! tracker untouched.

use crate::extent::Extent;
use crate::page::PageRecord;
use crate::{ExtentError, ExtentResult};
use core::alloc::Layout;

/// Kinds of records the tracker allocates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// A `(vpn, ppn)` page record
    Page,
    /// An extent header
    Extent,
}

impl RecordKind {
    /// Memory layout of one record of this kind
    pub fn layout(self) -> Layout {
        match self {
            Self::Page => Layout::new::<PageRecord>(),
            Self::Extent => Layout::new::<Extent>(),
        }
    }
}

/// Allocation statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
    /// Page records granted
    pub pages_allocated: u64,
    /// Page records returned
    pub pages_released: u64,
    /// Extents granted
    pub extents_allocated: u64,
    /// Extents returned
    pub extents_released: u64,
    /// Requests refused
    pub failures: u64,
    /// Bytes currently charged
    pub bytes_in_use: usize,
}

impl AllocStats {
    /// No activity
    pub const ZERO: Self = Self {
        pages_allocated: 0,
        pages_released: 0,
        extents_allocated: 0,
        extents_released: 0,
        failures: 0,
        bytes_in_use: 0,
    };

    /// Record a granted request
    pub fn on_allocate(&mut self, kind: RecordKind, layout: Layout) {
        match kind {
            RecordKind::Page => self.pages_allocated += 1,
            RecordKind::Extent => self.extents_allocated += 1,
        }
        self.bytes_in_use += layout.size();
    }

    /// Record a returned allocation
    pub fn on_release(&mut self, kind: RecordKind, layout: Layout) {
        match kind {
            RecordKind::Page => self.pages_released += 1,
            RecordKind::Extent => self.extents_released += 1,
        }
        self.bytes_in_use = self.bytes_in_use.saturating_sub(layout.size());
    }

    /// Live page records
    pub fn live_pages(&self) -> u64 {
        self.pages_allocated - self.pages_released
    }

    /// Live extents
    pub fn live_extents(&self) -> u64 {
        self.extents_allocated - self.extents_released
    }
}

/// Record allocator trait
///
/// Implementations decide whether the tracker may grow. They run with the
/// tracker lock held and must not block.
pub trait RecordAllocator: Send {
    /// Grant memory for one record
    fn allocate(&mut self, kind: RecordKind, layout: Layout) -> ExtentResult<()>;

    /// Return memory for one record
    fn release(&mut self, kind: RecordKind, layout: Layout);

    /// Get allocator name
    fn name(&self) -> &'static str;

    /// Get statistics
    fn stats(&self) -> AllocStats;
}

/// Default allocator backed by the global heap
///
/// Grants every request; heap exhaustion is caught separately through
/// fallible reservations on the page sequences.
#[derive(Debug, Default)]
pub struct GlobalRecords {
    stats: AllocStats,
}

impl GlobalRecords {
    /// Create a new allocator
    pub const fn new() -> Self {
        Self {
            stats: AllocStats::ZERO,
        }
    }
}

impl RecordAllocator for GlobalRecords {
    fn allocate(&mut self, kind: RecordKind, layout: Layout) -> ExtentResult<()> {
        self.stats.on_allocate(kind, layout);
        Ok(())
    }

    fn release(&mut self, kind: RecordKind, layout: Layout) {
        self.stats.on_release(kind, layout);
    }

    fn name(&self) -> &'static str {
        "Global Records"
    }

    fn stats(&self) -> AllocStats {
        self.stats
    }
}

/// Allocator that refuses once a fixed budget of records is spent
///
/// Useful for bounding tracker growth from atomic context.
#[derive(Debug)]
pub struct BudgetRecords {
    /// Remaining records
    remaining: usize,
    stats: AllocStats,
}

impl BudgetRecords {
    /// Create an allocator that grants `budget` records in total
    pub const fn new(budget: usize) -> Self {
        Self {
            remaining: budget,
            stats: AllocStats::ZERO,
        }
    }

    /// Records left in the budget
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl RecordAllocator for BudgetRecords {
    fn allocate(&mut self, kind: RecordKind, layout: Layout) -> ExtentResult<()> {
        if self.remaining == 0 {
            self.stats.failures += 1;
            return Err(ExtentError::OutOfMemory { kind });
        }
        self.remaining -= 1;
        self.stats.on_allocate(kind, layout);
        Ok(())
    }

    fn release(&mut self, kind: RecordKind, layout: Layout) {
        self.remaining += 1;
        self.stats.on_release(kind, layout);
    }

    fn name(&self) -> &'static str {
        "Budget Records"
    }

    fn stats(&self) -> AllocStats {
        self.stats
    }
}
