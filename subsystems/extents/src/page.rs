//! # Page Records
//!
//! The atomic unit handed to the tracker: one virtual page mapped to one
//! physical page.

/// A single `(vpn, ppn)` mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageRecord {
    /// Virtual page number
    vpn: u64,
    /// Physical page number
    ppn: u64,
}

impl PageRecord {
    /// Create a new page record
    pub const fn new(vpn: u64, ppn: u64) -> Self {
        Self { vpn, ppn }
    }

    /// Build a record from page-aligned addresses
    ///
    /// Returns `None` if either address is not aligned to `1 << page_shift`
    /// or the shift is wider than the address.
    pub fn from_addresses(virt: u64, phys: u64, page_shift: u32) -> Option<Self> {
        if page_shift >= u64::BITS {
            return None;
        }
        let mask = (1u64 << page_shift) - 1;
        if virt & mask != 0 || phys & mask != 0 {
            return None;
        }
        Some(Self::new(virt >> page_shift, phys >> page_shift))
    }

    /// Get the virtual page number
    #[inline]
    pub const fn vpn(&self) -> u64 {
        self.vpn
    }

    /// Get the physical page number
    #[inline]
    pub const fn ppn(&self) -> u64 {
        self.ppn
    }

    /// The page directly after this one in both address spaces
    pub fn next(&self) -> Option<Self> {
        Some(Self::new(self.vpn.checked_add(1)?, self.ppn.checked_add(1)?))
    }

    /// The page directly before this one in both address spaces
    pub fn prev(&self) -> Option<Self> {
        Some(Self::new(self.vpn.checked_sub(1)?, self.ppn.checked_sub(1)?))
    }

    /// Check if `other` immediately follows this page in both spaces
    #[inline]
    pub fn is_followed_by(&self, other: &Self) -> bool {
        self.next() == Some(*other)
    }
}

impl From<(u64, u64)> for PageRecord {
    fn from((vpn, ppn): (u64, u64)) -> Self {
        Self::new(vpn, ppn)
    }
}
