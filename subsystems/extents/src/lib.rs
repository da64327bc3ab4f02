//! # Helix Extent Tracker
//!
//! Tracks **extents**: maximal runs of pages that are contiguous in both the
//! virtual and the physical address space.
//!
//! The tracker provides:
//! - Insert-with-coalescing of `(vpn, ppn)` pairs arriving in any order
//! - An ordered extent index with predecessor/successor queries
//! - A spin-locked wrapper for use from atomic contexts
//! - Read-only statistics and log-based reporting
//!
//! ## Key Principle
//!
//! The index never holds two extents that could be merged. Every insert
//! either grows one extent, creates one extent, or grows one extent and
//! folds exactly one neighbor into it.
//!
//! ```text
//!   insert (3,3)
//!
//!   [0..2 | 0..2]          [4..6 | 4..6]
//!          \                  /
//!           +--> [0..6 | 0..6] (id of the lower extent survives)
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod allocator;
pub mod config;
pub mod extent;
pub mod index;
pub mod lock;
pub mod page;
pub mod stats;
pub mod tracker;


pub use allocator::{AllocStats, BudgetRecords, GlobalRecords, RecordAllocator, RecordKind};
pub use config::{TrackerConfig, TrackerFlags};
pub use extent::{Extent, ExtentDescriptor, ExtentId};
pub use index::{ExtentIndex, Position};
pub use lock::{ExtentTree, SpinGuard};
pub use page::PageRecord;
pub use stats::{describe_all, report, total_pages_and_extents, TrackerStats};
pub use tracker::{ExtentTracker, InsertOutcome};

use static_assertions::assert_impl_all;

/// Extent subsystem result type
pub type ExtentResult<T> = Result<T, ExtentError>;

/// Extent subsystem errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentError {
    /// The allocator refused memory for a new record
    OutOfMemory {
        /// What was being allocated
        kind: RecordKind,
    },
    /// The page falls inside an extent that is already tracked
    Overlap {
        /// Offending virtual page number
        vpn: u64,
        /// Extent whose range contains `vpn`
        extent: ExtentId,
    },
    /// Address is not a multiple of the configured page size
    Misaligned {
        /// Offending address
        addr: u64,
    },
    /// An index invariant does not hold
    Corrupted(&'static str),
}

impl core::fmt::Display for ExtentError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfMemory { kind } => write!(f, "out of memory allocating {:?} record", kind),
            Self::Overlap { vpn, extent } => {
                write!(f, "vpn {:#x} already tracked by extent {}", vpn, extent)
            }
            Self::Misaligned { addr } => write!(f, "address {:#x} is not page aligned", addr),
            Self::Corrupted(what) => write!(f, "extent index corrupted: {}", what),
        }
    }
}

// Trackers are handed between CPUs behind a spinlock.
assert_impl_all!(ExtentTracker: Send);
assert_impl_all!(ExtentTree: Send, Sync);
