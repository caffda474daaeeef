//! Address types and utilities for Sv39.
//!
//! This module provides types for physical and virtual addresses, as well as
//! physical and virtual page numbers, and the conversions between them.

use config::mm::{
    PA_WIDTH_SV39, PAGE_SIZE, PPN_WIDTH_SV39, PT_INDEX_WIDTH, PT_LEVELS, PTES_PER_TABLE,
    VA_WIDTH_SV39, VPN_WIDTH_SV39,
};

/// An address in physical memory defined in Sv39.
///
/// A physical address is a 56-bit integer; the upper 8 bits of the `usize`
/// must be the same as bit 55.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysAddr {
    addr: usize,
}

impl PhysAddr {
    /// Creates a new `PhysAddr` from the given address.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if the upper 8 bits of the address are not
    /// the same as bit 55.
    pub fn new(addr: usize) -> Self {
        let tmp = addr as isize >> PA_WIDTH_SV39;
        debug_assert!(
            tmp == 0 || tmp == -1,
            "invalid physical address: 0x{:x}",
            addr
        );
        PhysAddr { addr }
    }

    /// Gets the inner `usize` address.
    pub fn to_usize(self) -> usize {
        self.addr
    }

    /// Gets the offset within the page where the address resides.
    pub fn page_offset(self) -> usize {
        self.addr % PAGE_SIZE
    }

    /// Gets the page number where the address resides.
    pub fn page_number(self) -> PhysPageNum {
        let ppn_mask = (1 << PPN_WIDTH_SV39) - 1;
        let page_num = (self.addr / PAGE_SIZE) & ppn_mask;
        PhysPageNum::new(page_num)
    }
}

/// An address in virtual memory defined in Sv39.
///
/// A virtual address is a 39-bit integer; the upper 25 bits of the `usize`
/// must be the same as bit 38.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtAddr {
    addr: usize,
}

impl VirtAddr {
    /// Creates a new `VirtAddr` from the given address.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if the upper 25 bits of the address are not
    /// the same as bit 38.
    pub fn new(addr: usize) -> Self {
        let tmp = addr as isize >> VA_WIDTH_SV39;
        debug_assert!(
            tmp == 0 || tmp == -1,
            "invalid virtual address: 0x{:x}",
            addr
        );
        VirtAddr { addr }
    }

    /// Gets the inner `usize` address.
    pub fn to_usize(self) -> usize {
        self.addr
    }

    /// Gets the offset within the page where the address resides.
    pub fn page_offset(self) -> usize {
        self.addr % PAGE_SIZE
    }

    /// Gets the page number where the address resides.
    pub fn page_number(self) -> VirtPageNum {
        let vpn_mask = (1 << VPN_WIDTH_SV39) - 1;
        let page_num = (self.addr / PAGE_SIZE) & vpn_mask;
        VirtPageNum { page_num }
    }

    /// Rounds the address down to its page boundary.
    pub fn round_down(self) -> VirtAddr {
        VirtAddr {
            addr: self.addr & !(PAGE_SIZE - 1),
        }
    }

    /// Rounds the address up to the next page boundary.
    pub fn round_up(self) -> VirtAddr {
        VirtAddr {
            addr: (self.addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1),
        }
    }
}

/// A physical page number defined in Sv39.
///
/// A physical page number is a 44-bit unsigned integer; the upper 20 bits
/// must be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysPageNum {
    page_num: usize,
}

impl PhysPageNum {
    /// Creates a new `PhysPageNum` from the given page number.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if the upper 20 bits of the page number are
    /// not zero.
    pub fn new(page_num: usize) -> Self {
        let tmp = page_num >> PPN_WIDTH_SV39;
        debug_assert!(tmp == 0, "invalid physical page number: 0x{:x}", page_num);
        PhysPageNum { page_num }
    }

    /// Gets the inner `usize` page number.
    pub fn to_usize(self) -> usize {
        self.page_num
    }

    /// Gets the starting address of the page.
    pub fn address(self) -> PhysAddr {
        PhysAddr::new(self.page_num * PAGE_SIZE)
    }
}

/// A virtual page number defined in Sv39.
///
/// A virtual page number is a 27-bit unsigned integer; the upper bits must
/// be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtPageNum {
    page_num: usize,
}

impl VirtPageNum {
    /// Creates a new `VirtPageNum` from the given page number.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if the upper bits of the page number are not
    /// zero.
    pub fn new(page_num: usize) -> Self {
        let tmp = page_num >> VPN_WIDTH_SV39;
        debug_assert!(tmp == 0, "invalid virtual page number: 0x{:x}", page_num);
        VirtPageNum { page_num }
    }

    /// Gets the inner `usize` page number.
    pub fn to_usize(self) -> usize {
        self.page_num
    }

    /// Gets the starting address of the page.
    pub fn address(self) -> VirtAddr {
        VirtAddr::new(self.page_num * PAGE_SIZE)
    }

    /// Splits the page number into its per-level table indices.
    ///
    /// Index 0 is the leaf level; walkers iterate the result in reverse,
    /// starting from the root.
    pub fn indices(self) -> [usize; PT_LEVELS] {
        let mut rest = self.page_num;
        let mut indices = [0usize; PT_LEVELS];
        for index in indices.iter_mut() {
            *index = rest & (PTES_PER_TABLE - 1);
            rest >>= PT_INDEX_WIDTH;
        }
        indices
    }
}

impl From<PhysPageNum> for PhysAddr {
    fn from(ppn: PhysPageNum) -> PhysAddr {
        ppn.address()
    }
}

impl From<VirtPageNum> for VirtAddr {
    fn from(vpn: VirtPageNum) -> VirtAddr {
        vpn.address()
    }
}
