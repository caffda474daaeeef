//! Page-table construction and traversal.
//!
//! A page table is a three-level tree of 512-entry table frames. Non-leaf
//! entries carry `V` alone and point to the next level; leaf entries carry
//! permission bits and map (or, paged out, name) one user page.
//!
//! A `PageTable` owns its table frames. Leaf frames are owned by whoever
//! installed the mapping; the table only records them. Teardown is
//! explicit: [`PageTable::free_walk`] after every leaf has been unmapped.

use config::mm::{MAX_VA, PAGE_SIZE, PTES_PER_TABLE};
use systype::SysResult;

use crate::address::{PhysAddr, PhysPageNum, VirtAddr, VirtPageNum};
use crate::frame;
use crate::tlb;

use super::pte::{EntryRef, PageTableEntry, PteFlags};

/// A three-level Sv39 page table rooted at one frame.
#[derive(Debug)]
pub struct PageTable {
    /// Physical page number of the root table frame.
    root: PhysPageNum,
}

impl PageTable {
    /// Builds an empty page table.
    ///
    /// # Errors
    /// Returns `ENOMEM` if the root frame cannot be allocated.
    pub fn build() -> SysResult<Self> {
        let root = frame::alloc()?;
        // SAFETY: the frame was just allocated for the root table.
        unsafe {
            frame::zero(root);
        }
        Ok(PageTable { root })
    }

    /// Adopts an existing root frame, for inspection paths (trap handlers,
    /// debugging) that have only the raw root.
    ///
    /// # Safety
    /// `root` must be the root of a live page table, and the adopted value
    /// must not be used to tear it down while the owning table exists.
    pub unsafe fn from_root(root: PhysPageNum) -> Self {
        PageTable { root }
    }

    /// Gets the physical page number of the root table frame.
    pub fn root(&self) -> PhysPageNum {
        self.root
    }

    /// Views one table frame as its entry array.
    ///
    /// # Safety
    /// `ppn` must name a live page-table frame.
    unsafe fn table_mut(ppn: PhysPageNum) -> &'static mut [PageTableEntry; PTES_PER_TABLE] {
        // SAFETY: physical memory is identity-mapped; the frame holds a
        // table by the caller's contract.
        unsafe { &mut *(ppn.address().to_usize() as *mut _) }
    }

    /// Returns a handle on the leaf entry mapping `vpn`, or `None` when a
    /// non-leaf entry on the path is absent.
    ///
    /// The returned leaf may itself be unmapped; this function never
    /// inspects leaf flags.
    ///
    /// # Panics
    /// Panics if the address is at or above `MAX_VA`.
    pub fn entry(&self, vpn: VirtPageNum) -> Option<EntryRef> {
        assert!(vpn.address().to_usize() < MAX_VA, "page table walk out of range");
        let mut ppn = self.root;
        for (level, index) in vpn.indices().into_iter().enumerate().rev() {
            // SAFETY: `ppn` is the root or was read from a valid non-leaf
            // entry below.
            let slot = unsafe { &mut Self::table_mut(ppn)[index] };
            if level == 0 {
                // SAFETY: the slot lives in a table frame owned by `self`.
                return Some(unsafe { EntryRef::new(slot) });
            }
            if !slot.is_valid() {
                return None;
            }
            ppn = slot.ppn();
        }
        unreachable!();
    }

    /// Returns a handle on the leaf entry mapping `vpn`, allocating any
    /// missing tables on the path. New non-leaf entries carry `V` alone.
    ///
    /// # Errors
    /// Returns `ENOMEM` if a table frame cannot be allocated. Tables
    /// already created on the path are kept; a later walk reuses them.
    ///
    /// # Panics
    /// Panics if the address is at or above `MAX_VA`.
    pub fn entry_or_create(&mut self, vpn: VirtPageNum) -> SysResult<EntryRef> {
        assert!(vpn.address().to_usize() < MAX_VA, "page table walk out of range");
        let mut ppn = self.root;
        for (level, index) in vpn.indices().into_iter().enumerate().rev() {
            // SAFETY: `ppn` is the root or was read from a valid non-leaf
            // entry below.
            let slot = unsafe { &mut Self::table_mut(ppn)[index] };
            if level == 0 {
                // SAFETY: the slot lives in a table frame owned by `self`.
                return Ok(unsafe { EntryRef::new(slot) });
            }
            if !slot.is_valid() {
                let sub = frame::alloc()?;
                // SAFETY: the frame was just allocated for a table.
                unsafe {
                    frame::zero(sub);
                }
                *slot = PageTableEntry::new(sub, PteFlags::V);
            }
            ppn = slot.ppn();
        }
        unreachable!();
    }

    /// Creates leaf mappings for `[va, va + size)` (rounded outward to page
    /// boundaries) onto consecutive frames starting at `pa`.
    ///
    /// # Errors
    /// Returns `ENOMEM` if a table frame cannot be allocated; mappings
    /// already written stay in place and the caller unwinds.
    ///
    /// # Panics
    /// Panics if `size` is zero or a target leaf is already valid.
    pub fn map_range(
        &mut self,
        va: VirtAddr,
        size: usize,
        pa: PhysAddr,
        flags: PteFlags,
    ) -> SysResult<()> {
        assert_ne!(size, 0, "map_range: empty range");
        let first = va.round_down().page_number().to_usize();
        let last = VirtAddr::new(va.to_usize() + size - 1)
            .round_down()
            .page_number()
            .to_usize();
        let mut pa = pa.to_usize();
        for vpn in first..=last {
            let mut entry = self.entry_or_create(VirtPageNum::new(vpn))?;
            assert!(!entry.load().is_valid(), "map_range: remap");
            entry.store(PageTableEntry::new(
                PhysAddr::new(pa).page_number(),
                flags | PteFlags::V,
            ));
            pa += PAGE_SIZE;
        }
        Ok(())
    }

    /// Clears the user bit on the leaf mapping `va`, making the page
    /// inaccessible from user mode. Used for stack guard pages.
    ///
    /// # Panics
    /// Panics if the leaf is absent.
    pub fn clear_user(&mut self, va: VirtAddr) {
        let mut entry = self.entry(va.page_number()).expect("clear_user: no leaf");
        let pte = entry.load();
        entry.store(PageTableEntry::new(pte.ppn(), pte.flags() - PteFlags::U));
        tlb::sfence_vma();
    }

    /// Recursively frees the table frames, the root included.
    ///
    /// # Panics
    /// Panics if any leaf mapping is still valid; the caller must have
    /// unmapped the whole space first.
    pub fn free_walk(self) {
        Self::free_table(self.root);
    }

    fn free_table(ppn: PhysPageNum) {
        // SAFETY: `ppn` names a table frame owned by this tree.
        let table = unsafe { Self::table_mut(ppn) };
        for slot in table.iter_mut() {
            if slot.is_valid() {
                if slot.is_leaf() {
                    panic!("free_walk: leaf");
                }
                Self::free_table(slot.ppn());
                *slot = PageTableEntry::empty();
            }
        }
        frame::dealloc(ppn);
    }
}
