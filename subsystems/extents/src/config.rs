//! # Tracker Configuration

use bitflags::bitflags;

/// Default page shift (4 KiB pages)
pub const DEFAULT_PAGE_SHIFT: u32 = 12;

bitflags! {
    /// Tracker behavior flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TrackerFlags: u32 {
        /// Log every insert outcome at trace level
        const TRACE_INSERTS = 1 << 0;
        /// Re-check every index invariant after each insert
        const VERIFY = 1 << 1;
        /// Everything useful while debugging
        const DEBUG = Self::TRACE_INSERTS.bits() | Self::VERIFY.bits();
    }
}

/// Tracker configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Behavior flags
    pub flags: TrackerFlags,
    page_shift: u32,
}

impl TrackerConfig {
    /// Default configuration
    pub const fn new() -> Self {
        Self {
            flags: TrackerFlags::empty(),
            page_shift: DEFAULT_PAGE_SHIFT,
        }
    }

    /// Replace the flags
    pub const fn with_flags(mut self, flags: TrackerFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Replace the page shift
    ///
    /// Panics if the shift does not fit a 64-bit address.
    pub const fn with_page_shift(mut self, page_shift: u32) -> Self {
        assert!(page_shift < u64::BITS, "page shift out of range");
        self.page_shift = page_shift;
        self
    }

    /// log2 of the page size in bytes, always below 64
    pub const fn page_shift(&self) -> u32 {
        self.page_shift
    }

    /// Page size in bytes
    pub const fn page_size(&self) -> u64 {
        1 << self.page_shift
    }

    /// Check if a flag is set
    pub fn has(&self, flag: TrackerFlags) -> bool {
        self.flags.contains(flag)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert!(config.flags.is_empty());
        assert_eq!(config.page_size(), 4096);
    }

    #[test]
    fn test_builders() {
        let config = TrackerConfig::new()
            .with_flags(TrackerFlags::DEBUG)
            .with_page_shift(21);

        assert!(config.has(TrackerFlags::TRACE_INSERTS));
        assert!(config.has(TrackerFlags::VERIFY));
        assert_eq!(config.page_size(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_largest_page_shift() {
        let config = TrackerConfig::new().with_page_shift(63);
        assert_eq!(config.page_shift(), 63);
        assert_eq!(config.page_size(), 1 << 63);
    }

    #[test]
    #[should_panic(expected = "page shift out of range")]
    fn test_page_shift_rejects_64() {
        let _ = TrackerConfig::new().with_page_shift(64);
    }
}
