//! Page-table entries.
//!
//! This module provides the `PageTableEntry` type along with its flag set
//! and [`EntryRef`], the handle through which leaf entries are read and
//! rewritten.

use bitflags::bitflags;

use config::mm::PPN_WIDTH_SV39;

use crate::address::PhysPageNum;

/// Offset of the physical page number in a page table entry. The physical
/// page number occupies bits 10-53.
const PPN_OFFSET: usize = 10;

bitflags! {
    /// Flags for a page table entry.
    ///
    /// The architectural bits are defined by RISC-V Sv39:
    ///
    /// - `V`: Valid. When set, the entry is valid. If one of the R, W, or X
    ///   bits is also set, the entry maps a physical page; otherwise it
    ///   points to a next-level page table.
    /// - `R`: Read. The mapped page is readable.
    /// - `W`: Write. The mapped page is writable.
    /// - `X`: Execute. The mapped page is executable.
    /// - `U`: User. The mapped page is accessible in user mode.
    /// - `G`: Global. The mapping exists in all address spaces.
    /// - `A`: Accessed. The mapped page has been read or written.
    /// - `D`: Dirty. The mapped page has been written to.
    ///
    /// Bits 8 and 9 are reserved for supervisor software (`RSW`). This
    /// subsystem defines bit 8 as:
    ///
    /// - `PG`: Paged out. The leaf's page lives in the process's backing
    ///   store. `V` and `PG` are mutually exclusive on a leaf; a leaf is
    ///   mapped when either is set, and callers that treat "not mapped"
    ///   uniformly must test both.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u16 {
        const V = 1 << 0;
        const R = 1 << 1;
        const W = 1 << 2;
        const X = 1 << 3;
        const U = 1 << 4;
        const G = 1 << 5;
        const A = 1 << 6;
        const D = 1 << 7;
        const PG = 1 << 8;
    }
}

impl PteFlags {
    /// Bits that make an entry a leaf.
    pub const LEAF: Self = Self::R.union(Self::W).union(Self::X);
}

/// A page table entry defined in Sv39.
///
/// The lower 10 bits of an entry are flags, bits 10-53 are the physical
/// page number, and the upper 10 bits are reserved for extensions. In our
/// implementation the upper 10 bits are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PageTableEntry {
    bits: usize,
}

impl PageTableEntry {
    /// Creates a page table entry from the given physical page number and
    /// flags.
    pub fn new(ppn: PhysPageNum, flags: PteFlags) -> Self {
        PageTableEntry {
            bits: ppn.to_usize() << PPN_OFFSET | flags.bits() as usize,
        }
    }

    /// Returns the empty (unmapped) entry.
    pub fn empty() -> Self {
        PageTableEntry { bits: 0 }
    }

    /// Returns the physical page number in the entry.
    pub fn ppn(self) -> PhysPageNum {
        let ppn_mask = (1 << PPN_WIDTH_SV39) - 1;
        PhysPageNum::new((self.bits >> PPN_OFFSET) & ppn_mask)
    }

    /// Returns the flags in the entry.
    pub fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.bits as u16)
    }

    /// Returns whether the entry is valid.
    pub fn is_valid(self) -> bool {
        self.flags().contains(PteFlags::V)
    }

    /// Returns whether the entry's page is paged out to the backing store.
    pub fn is_paged_out(self) -> bool {
        self.flags().contains(PteFlags::PG)
    }

    /// Returns whether the entry maps a page at all, resident or paged out.
    pub fn is_mapped(self) -> bool {
        self.flags().intersects(PteFlags::V | PteFlags::PG)
    }

    /// Returns whether the entry is a leaf.
    pub fn is_leaf(self) -> bool {
        self.flags().intersects(PteFlags::LEAF)
    }

    /// Returns whether the mapped page is writable.
    pub fn is_writable(self) -> bool {
        self.flags().contains(PteFlags::W)
    }

    /// Returns whether the mapped page is accessible in user mode.
    pub fn is_user(self) -> bool {
        self.flags().contains(PteFlags::U)
    }

    /// Returns whether the mapped page has been accessed.
    pub fn is_accessed(self) -> bool {
        self.flags().contains(PteFlags::A)
    }
}

impl Default for PageTableEntry {
    /// Returns a default page table entry, which is unmapped.
    fn default() -> Self {
        Self::empty()
    }
}

/// A handle on one leaf slot of a page table.
///
/// Leaf entries are read and rewritten through this type rather than
/// through references into table frames; `store` is the single point where
/// the valid/paged-out exclusion is checked. Callers serialise access
/// through the owning process's lock, and follow every store that clears
/// `V` or changes flags with a TLB fence.
pub struct EntryRef {
    slot: *mut PageTableEntry,
}

impl EntryRef {
    /// Wraps a leaf slot.
    ///
    /// # Safety
    /// `slot` must point into a live page-table frame and stay valid for
    /// the lifetime of the handle.
    pub(crate) unsafe fn new(slot: *mut PageTableEntry) -> Self {
        EntryRef { slot }
    }

    /// Reads the entry.
    pub fn load(&self) -> PageTableEntry {
        unsafe { *self.slot }
    }

    /// Writes the entry.
    ///
    /// # Panics
    /// In debug builds, panics if the entry has both `V` and `PG` set.
    pub fn store(&mut self, entry: PageTableEntry) {
        debug_assert!(
            !entry
                .flags()
                .contains(PteFlags::V | PteFlags::PG),
            "entry both resident and paged out"
        );
        unsafe {
            *self.slot = entry;
        }
    }
}
