//! # Locked Extent Tree
//!
//! The tracker may be fed from contexts that cannot sleep, so it is guarded
//! by a spinlock rather than a blocking mutex.
//!
//! The lock contract is carried by the guard: [`ExtentTracker::insert`] takes
//! `&mut self`, which a shared tree only hands out through a live
//! [`SpinGuard`]. The lock is held on entry, still held on return, and
//! released when the caller drops the guard.
//!
//! ```ignore
//! let tree = ExtentTree::new();
//! let mut tracker = tree.lock();
//! tracker.insert(5, 205)?;
//! tracker.insert(6, 206)?;
//! drop(tracker);
//! ```

use crate::allocator::{GlobalRecords, RecordAllocator};
use crate::config::TrackerConfig;
use crate::stats::TrackerStats;
use crate::tracker::{ExtentTracker, InsertOutcome};
use crate::ExtentResult;
use spin::{Mutex, MutexGuard};

/// Guard proving the tree lock is held
pub type SpinGuard<'a, A> = MutexGuard<'a, ExtentTracker<A>>;

/// Extent tracker behind a spinlock
#[derive(Debug)]
pub struct ExtentTree<A: RecordAllocator = GlobalRecords> {
    tracker: Mutex<ExtentTracker<A>>,
}

impl ExtentTree<GlobalRecords> {
    /// Create an empty tree on the global heap
    pub const fn new() -> Self {
        Self {
            tracker: Mutex::new(ExtentTracker::new()),
        }
    }
}

impl Default for ExtentTree<GlobalRecords> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: RecordAllocator> ExtentTree<A> {
    /// Wrap an existing tracker
    pub const fn from_tracker(tracker: ExtentTracker<A>) -> Self {
        Self {
            tracker: Mutex::new(tracker),
        }
    }

    /// Create an empty tree with the given allocator and configuration
    pub fn with_allocator(allocator: A, config: TrackerConfig) -> Self {
        Self::from_tracker(ExtentTracker::with_allocator(allocator).with_config(config))
    }

    /// Spin until the lock is taken
    pub fn lock(&self) -> SpinGuard<'_, A> {
        self.tracker.lock()
    }

    /// Take the lock only if it is free right now
    pub fn try_lock(&self) -> Option<SpinGuard<'_, A>> {
        self.tracker.try_lock()
    }

    /// Check if some CPU holds the lock
    pub fn is_locked(&self) -> bool {
        self.tracker.is_locked()
    }

    /// Lock, insert one page, unlock
    pub fn insert(&self, vpn: u64, ppn: u64) -> ExtentResult<InsertOutcome> {
        self.lock().insert(vpn, ppn)
    }

    /// Lock and take a statistics snapshot
    pub fn snapshot_stats(&self) -> TrackerStats {
        self.lock().snapshot_stats()
    }

    /// Unwrap the tracker
    pub fn into_inner(self) -> ExtentTracker<A> {
        self.tracker.into_inner()
    }
}
