//! User address spaces.
//!
//! An [`AddrSpace`] is the per-process handle to the virtual-memory
//! subsystem. It owns the page table, the resident-page and swap-slot
//! tables, the process's backing store, and the replacement policy, and it
//! is the unit every public operation is addressed to.
//!
//! Every user page of a process is in exactly one of three states, encoded
//! jointly by its leaf entry and the tracking tables:
//!
//! - **unmapped** — no leaf (or an empty one), no slot in either table;
//! - **resident** — a valid leaf pointing at a frame, plus a matching
//!   resident slot;
//! - **paged out** — a leaf with the paged-out bit and no frame, plus a
//!   matching swap slot.
//!
//! The tables and the page-table root are protected by the process lock.
//! Backing-store transfers may block, so they run inside
//! [`AddrSpace::io_window`], the single place where the lock is dropped and
//! retaken; no callee ever releases a lock it did not acquire. The window
//! is sound because a process is single-threaded in this kernel: only the
//! aging tick can interleave, and it touches counters, never slots or
//! leaves under transfer.

use core::cmp::min;
use core::ptr;

use config::mm::{MAX_RESIDENT_PAGES, MAX_SWAPPED_PAGES, MAX_VA, PAGE_SIZE};
use config::process::LAST_BOOTSTRAP_PID;
use mutex::{Spin, SpinLock, SpinMutexGuard};
use systype::{SysError, SysResult};

use crate::address::{PhysAddr, PhysPageNum, VirtAddr};
use crate::frame;
use crate::tlb;

use super::mem_perm::MemPerm;
use super::page_table::PageTable;
use super::policy::Policy;
use super::pte::{PageTableEntry, PteFlags};
use super::swap::SwapBacking;
use super::tracking::{PageSlot, SlotState, SlotTable};

/// Permissions for pages of the user image.
const USER_IMAGE_PERM: MemPerm = MemPerm::R
    .union(MemPerm::W)
    .union(MemPerm::X)
    .union(MemPerm::U);

/// Bit ORed into an aging counter when the page was accessed this tick.
const COUNTER_MSB: u32 = 1 << 31;

/// State behind the process lock.
#[derive(Debug)]
pub struct AddrSpaceInner {
    /// The page table.
    table: PageTable,
    /// Pages currently backed by frames; doubles as the FIFO queue.
    resident: SlotTable,
    /// Pages evicted to the backing store, indexed by store offset.
    swapped: SlotTable,
}

/// A user address space.
///
/// See the module-level documentation for the state model and the locking
/// contract.
pub struct AddrSpace<S: SwapBacking> {
    pid: usize,
    policy: Policy,
    swap: S,
    inner: SpinLock<AddrSpaceInner>,
}

type Guard<'a> = SpinMutexGuard<'a, AddrSpaceInner, Spin>;

impl<S: SwapBacking> AddrSpace<S> {
    /// Builds an empty address space for process `pid`.
    ///
    /// # Errors
    /// Returns `ENOMEM` if the root table frame cannot be allocated.
    pub fn build(pid: usize, policy: Policy, swap: S) -> SysResult<Self> {
        Ok(AddrSpace {
            pid,
            policy,
            swap,
            inner: SpinLock::new(AddrSpaceInner {
                table: PageTable::build()?,
                resident: SlotTable::new(),
                swapped: SlotTable::new(),
            }),
        })
    }

    pub fn pid(&self) -> usize {
        self.pid
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Root table frame, for programming `satp`.
    pub fn root(&self) -> PhysPageNum {
        self.inner.lock().table.root()
    }

    /// Number of occupied resident slots.
    pub fn resident_count(&self) -> usize {
        self.inner.lock().resident.used_count()
    }

    /// Number of occupied swap slots.
    pub fn swapped_count(&self) -> usize {
        self.inner.lock().swapped.used_count()
    }

    /// Flags of the leaf mapping `va`, if the page is mapped at all.
    pub fn page_flags(&self, va: VirtAddr) -> Option<PteFlags> {
        let guard = self.inner.lock();
        let entry = guard.table.entry(va.round_down().page_number())?;
        let pte = entry.load();
        pte.is_mapped().then(|| pte.flags())
    }

    /// Whether this process participates in paging bookkeeping. The
    /// bootstrap processes keep their whole image resident.
    fn tracked(&self) -> bool {
        self.policy.swapping_enabled() && self.pid > LAST_BOOTSTRAP_PID
    }

    /// Runs `io` with the process lock released and retakes it.
    ///
    /// Backing-store transfers may block on disk I/O and must not spin a
    /// hart under the process lock. This is the only place the lock is
    /// dropped and reacquired.
    fn io_window<'a, R>(&'a self, guard: Guard<'a>, io: impl FnOnce(&S) -> R) -> (Guard<'a>, R) {
        drop(guard);
        let result = io(&self.swap);
        (self.inner.lock(), result)
    }

    /// Marks resident slot `index` as tracking `va` afresh.
    fn activate(&self, resident: &mut SlotTable, index: usize, va: VirtAddr, root: PhysPageNum) {
        *resident.get_mut(index) = PageSlot {
            state: SlotState::Used,
            va,
            root,
            counter: self.policy.reset_counter(),
        };
        if self.policy == Policy::Scfifo {
            resident.move_to_tail(index);
        }
    }

    /// Evicts one resident page to the backing store and recycles its slot
    /// for `new_va`.
    ///
    /// Runs with the lock held, transferring inside the unlocked window.
    /// Nothing is rewritten until the write has succeeded, so a failed
    /// write leaves the victim resident and surfaces as `EIO`.
    ///
    /// # Panics
    /// Panics if no swap slot is free; growth is bounded before eviction is
    /// ever needed, so a full backing store here is a broken invariant.
    fn swap_out<'a>(&'a self, mut guard: Guard<'a>, new_va: VirtAddr) -> SysResult<Guard<'a>> {
        let (victim, victim_va, victim_ppn, swap_index) = {
            let AddrSpaceInner {
                table,
                resident,
                swapped,
            } = &mut *guard;
            let victim = self
                .policy
                .pick_victim(resident, table)
                .expect("swap_out: policy selects no victims");
            let slot = resident.get(victim);
            debug_assert!(slot.is_used(), "swap_out: vacant victim slot");
            debug_assert_eq!(slot.root, table.root());
            let victim_va = slot.va;
            let swap_index = swapped
                .first_unused()
                .expect("swap_out: backing store full");
            let entry = table
                .entry(victim_va.page_number())
                .expect("swap_out: victim has no leaf");
            let pte = entry.load();
            assert!(pte.is_valid(), "swap_out: victim not resident");
            (victim, victim_va, pte.ppn(), swap_index)
        };
        log::trace!(
            "pid {}: swap out va {:#x} to slot {}",
            self.pid,
            victim_va.to_usize(),
            swap_index
        );

        let (mut guard, wrote) =
            self.io_window(guard, |swap| swap.write_page(victim_ppn, swap_index));
        wrote?;

        frame::dealloc(victim_ppn);
        let inner = &mut *guard;
        *inner.swapped.get_mut(swap_index) = *inner.resident.get(victim);
        let mut entry = inner
            .table
            .entry(victim_va.page_number())
            .expect("swap_out: victim has no leaf");
        let flags = (entry.load().flags() - PteFlags::V) | PteFlags::PG;
        entry.store(PageTableEntry::new(PhysPageNum::new(0), flags));
        tlb::sfence_vma();

        let root = inner.table.root();
        self.activate(&mut inner.resident, victim, new_va, root);
        Ok(guard)
    }

    /// Grows the image from `old_sz` to `new_sz` bytes, which need not be
    /// page-aligned. New pages are zeroed, mapped `R|W|X|U`, and registered
    /// in the resident set, evicting older pages once the set is full.
    /// Returns the new size.
    ///
    /// # Errors
    /// Returns `ENOMEM` when frames run out or when resident and swapped
    /// pages together would exceed both tables' capacity, and `EIO` when an
    /// eviction write fails. Every page this call mapped is rolled back
    /// before the error is returned.
    pub fn grow(&self, old_sz: usize, new_sz: usize) -> SysResult<usize> {
        if new_sz < old_sz {
            return Ok(old_sz);
        }
        let start = VirtAddr::new(old_sz).round_up().to_usize();
        for va in (start..new_sz).step_by(PAGE_SIZE) {
            if let Err(err) = self.grow_one(VirtAddr::new(va)) {
                self.shrink(va, old_sz);
                return Err(err);
            }
        }
        Ok(new_sz)
    }

    fn grow_one(&self, va: VirtAddr) -> SysResult<()> {
        let ppn = frame::alloc()?;
        // SAFETY: the frame was just allocated for this page.
        unsafe {
            frame::zero(ppn);
        }
        let mut guard = self.inner.lock();
        if self.tracked() {
            let occupied = guard.resident.used_count() + guard.swapped.used_count();
            if occupied >= MAX_RESIDENT_PAGES + MAX_SWAPPED_PAGES {
                drop(guard);
                frame::dealloc(ppn);
                return Err(SysError::ENOMEM);
            }
        }
        if let Err(err) = guard
            .table
            .map_range(va, PAGE_SIZE, ppn.address(), USER_IMAGE_PERM.into())
        {
            drop(guard);
            frame::dealloc(ppn);
            return Err(err);
        }
        if self.tracked() {
            let root = guard.table.root();
            match guard.resident.first_unused() {
                Some(slot) => self.activate(&mut guard.resident, slot, va, root),
                None => {
                    if let Err(err) = self.swap_out(guard, va) {
                        // take the freshly mapped page back out
                        let mut guard = self.inner.lock();
                        let mut entry = guard
                            .table
                            .entry(va.page_number())
                            .expect("grow: lost fresh leaf");
                        entry.store(PageTableEntry::empty());
                        tlb::sfence_vma();
                        drop(guard);
                        frame::dealloc(ppn);
                        return Err(err);
                    }
                }
            }
        }
        Ok(())
    }

    /// Shrinks the image from `old_sz` to `new_sz` bytes, unmapping and
    /// freeing the tail pages. Returns the new size.
    pub fn shrink(&self, old_sz: usize, new_sz: usize) -> usize {
        if new_sz >= old_sz {
            return old_sz;
        }
        let old_top = VirtAddr::new(old_sz).round_up();
        let new_top = VirtAddr::new(new_sz).round_up();
        if new_top < old_top {
            let npages = (old_top.to_usize() - new_top.to_usize()) / PAGE_SIZE;
            self.unmap_range(new_top, npages, true);
        }
        new_sz
    }

    /// Removes `npages` mappings starting at page-aligned `va`. Resident
    /// pages free their frame when `free_frames` is set; paged-out pages
    /// discard their backing copy unread. Matching slots in both tracking
    /// tables are cleared.
    ///
    /// # Panics
    /// Panics if `va` is not page-aligned, or if any page in the range is
    /// unmapped or carries a non-leaf entry.
    pub fn unmap_range(&self, va: VirtAddr, npages: usize, free_frames: bool) {
        assert_eq!(va.page_offset(), 0, "unmap_range: not aligned");
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let root = inner.table.root();
        for i in 0..npages {
            let page = VirtAddr::new(va.to_usize() + i * PAGE_SIZE);
            let mut entry = inner
                .table
                .entry(page.page_number())
                .expect("unmap_range: no leaf");
            let pte = entry.load();
            assert!(pte.is_mapped(), "unmap_range: not mapped");
            assert!(pte.is_leaf(), "unmap_range: not a leaf");
            if pte.is_valid() {
                if free_frames {
                    frame::dealloc(pte.ppn());
                }
                inner.resident.clear_matching(page, root);
            } else {
                inner.swapped.clear_va(page);
            }
            entry.store(PageTableEntry::empty());
        }
        tlb::sfence_vma();
    }

    /// Makes the page at `va` inaccessible from user mode; used to turn the
    /// page below the stack into a guard page.
    pub fn clear_user(&self, va: VirtAddr) {
        self.inner.lock().table.clear_user(va);
    }

    /// Loads the bootstrap image at address zero, for the very first
    /// process.
    ///
    /// # Panics
    /// Panics if `code` is a page or larger.
    pub fn load_initial(&self, code: &[u8]) -> SysResult<()> {
        assert!(code.len() < PAGE_SIZE, "load_initial: more than a page");
        let ppn = frame::alloc()?;
        // SAFETY: the frame was just allocated for the image.
        unsafe {
            frame::zero(ppn);
        }
        let mut guard = self.inner.lock();
        if let Err(err) =
            guard
                .table
                .map_range(VirtAddr::new(0), PAGE_SIZE, ppn.address(), USER_IMAGE_PERM.into())
        {
            drop(guard);
            frame::dealloc(ppn);
            return Err(err);
        }
        drop(guard);
        // SAFETY: the frame was just allocated and mapped for the image.
        unsafe {
            ptr::copy_nonoverlapping(
                code.as_ptr(),
                ppn.address().to_usize() as *mut u8,
                code.len(),
            );
        }
        Ok(())
    }

    /// Services a not-present fault at `va` by bringing the page back from
    /// the backing store, evicting another page if the resident set is
    /// full.
    ///
    /// The page is read before any eviction is attempted, so the fault is
    /// serviceable even when resident and swap slots are all occupied: the
    /// faulted page's own slot is vacated first and may receive the victim.
    ///
    /// # Errors
    /// Returns `EFAULT` unless `va` names a paged-out page, and `ENOMEM`
    /// when no frame is available for it.
    ///
    /// # Panics
    /// Panics if a backing-store transfer fails; a fault that cannot be
    /// serviced is fatal in this kernel.
    pub fn fault_load(&self, va: VirtAddr) -> SysResult<()> {
        if va.to_usize() >= MAX_VA {
            return Err(SysError::EFAULT);
        }
        let round = va.round_down();
        let new_ppn = frame::alloc()?;
        let guard = self.inner.lock();
        let Some(entry) = guard.table.entry(round.page_number()) else {
            drop(guard);
            frame::dealloc(new_ppn);
            return Err(SysError::EFAULT);
        };
        if !entry.load().is_paged_out() {
            drop(guard);
            frame::dealloc(new_ppn);
            return Err(SysError::EFAULT);
        }
        let swap_index = guard
            .swapped
            .find(round)
            .expect("fault_load: page has no backing slot");
        log::trace!(
            "pid {}: swap in va {:#x} from slot {}",
            self.pid,
            round.to_usize(),
            swap_index
        );

        let (mut guard, read) = self.io_window(guard, |swap| swap.read_page(new_ppn, swap_index));
        read.expect("fault_load: backing store read failed");
        guard.swapped.get_mut(swap_index).clear();

        let claimed = guard.resident.first_unused();
        let mut guard = match claimed {
            Some(_) => guard,
            None => self
                .swap_out(guard, round)
                .unwrap_or_else(|_| panic!("fault_load: backing store write failed")),
        };
        let inner = &mut *guard;
        if let Some(slot) = claimed {
            let root = inner.table.root();
            self.activate(&mut inner.resident, slot, round, root);
        }
        let mut entry = inner
            .table
            .entry(round.page_number())
            .expect("fault_load: leaf vanished");
        let pte = entry.load();
        entry.store(PageTableEntry::new(
            new_ppn,
            (pte.flags() - PteFlags::PG) | PteFlags::V,
        ));
        tlb::sfence_vma();
        Ok(())
    }

    /// Scheduler-tick hook: age every resident page's counter from its
    /// accessed bit. Counters shift right once per tick; a page accessed
    /// since the last tick gets the top bit and loses its accessed bit.
    pub fn aging_tick(&self) {
        if !self.policy.uses_aging() {
            return;
        }
        let mut guard = self.inner.lock();
        let AddrSpaceInner {
            table, resident, ..
        } = &mut *guard;
        let mut cleared = false;
        for slot in resident.iter_mut() {
            if !slot.is_used() {
                continue;
            }
            slot.counter >>= 1;
            let mut entry = table
                .entry(slot.va.page_number())
                .expect("aging_tick: tracked page has no leaf");
            let pte = entry.load();
            if pte.is_accessed() {
                slot.counter |= COUNTER_MSB;
                entry.store(PageTableEntry::new(pte.ppn(), pte.flags() - PteFlags::A));
                cleared = true;
            }
        }
        if cleared {
            tlb::sfence_vma();
        }
    }

    /// Copies this address space's first `size` bytes of image into
    /// `child`, page by page. Each page keeps its exact flag pattern:
    /// resident pages get a fresh frame holding a copy, paged-out pages are
    /// copied from this process's backing slot into the child's backing
    /// slot at the same index.
    ///
    /// Tracking slots are mirrored at their parent indices, preserving the
    /// FIFO order for second-chance replacement.
    ///
    /// # Errors
    /// On any failure every page already copied into the child is unmapped
    /// and freed, and the child is left empty.
    ///
    /// # Panics
    /// Panics if a page of the image is unmapped, or if reading this
    /// process's backing store fails.
    pub fn fork_into(&self, child: &AddrSpace<S>, size: usize) -> SysResult<()> {
        let mut done = 0usize;
        for va in (0..size).step_by(PAGE_SIZE) {
            if let Err(err) = self.fork_page(child, VirtAddr::new(va)) {
                if done > 0 {
                    child.unmap_range(VirtAddr::new(0), done, true);
                }
                return Err(err);
            }
            done += 1;
        }
        Ok(())
    }

    fn fork_page(&self, child: &AddrSpace<S>, va: VirtAddr) -> SysResult<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let root = inner.table.root();
        let mut entry = inner
            .table
            .entry(va.page_number())
            .expect("fork_into: page should exist");
        let pte = entry.load();
        assert!(pte.is_mapped(), "fork_into: page not present");
        let flags = pte.flags();

        if pte.is_paged_out() {
            // drop any transient valid bit before copying through the slot
            entry.store(PageTableEntry::new(pte.ppn(), flags - PteFlags::V));
            tlb::sfence_vma();
            let slot = inner
                .swapped
                .find(va)
                .expect("fork_into: page has no backing slot");
            let counter = inner.swapped.get(slot).counter;

            let bounce = frame::alloc()?;
            let (guard, copied) = self.io_window(guard, |swap| {
                swap.read_page(bounce, slot)
                    .expect("fork_into: backing store read failed");
                child.swap.write_page(bounce, slot)
            });
            frame::dealloc(bounce);
            copied?;
            drop(guard);

            let mut child_guard = child.inner.lock();
            let child_inner = &mut *child_guard;
            let child_root = child_inner.table.root();
            let mut child_entry = child_inner.table.entry_or_create(va.page_number())?;
            assert!(!child_entry.load().is_mapped(), "fork_into: remap");
            child_entry.store(PageTableEntry::new(PhysPageNum::new(0), flags - PteFlags::V));
            *child_inner.swapped.get_mut(slot) = PageSlot {
                state: SlotState::Used,
                va,
                root: child_root,
                counter,
            };
        } else {
            let src = pte.ppn();
            let mirrored = inner
                .resident
                .find_owned(va, root)
                .map(|index| (index, inner.resident.get(index).counter));
            let mem = frame::alloc()?;
            // SAFETY: `src` backs a resident page and `mem` was just
            // allocated for its copy.
            unsafe {
                ptr::copy_nonoverlapping(
                    src.address().to_usize() as *const u8,
                    mem.address().to_usize() as *mut u8,
                    PAGE_SIZE,
                );
            }
            drop(guard);

            let mut child_guard = child.inner.lock();
            let child_inner = &mut *child_guard;
            if let Err(err) = child_inner
                .table
                .map_range(va, PAGE_SIZE, mem.address(), flags - PteFlags::V)
            {
                drop(child_guard);
                frame::dealloc(mem);
                return Err(err);
            }
            if let Some((index, counter)) = mirrored {
                let child_root = child_inner.table.root();
                *child_inner.resident.get_mut(index) = PageSlot {
                    state: SlotState::Used,
                    va,
                    root: child_root,
                    counter,
                };
            }
        }
        Ok(())
    }

    /// Physical address of the frame backing `va`'s page, for kernel
    /// copies. `None` when the address is out of range, unmapped, paged
    /// out, or not user-accessible — a paged-out page must take the fault
    /// path rather than let a kernel copy succeed against a stale frame.
    pub fn user_walk_addr(&self, va: VirtAddr) -> Option<PhysAddr> {
        if va.to_usize() >= MAX_VA {
            return None;
        }
        let guard = self.inner.lock();
        let entry = guard.table.entry(va.round_down().page_number())?;
        let pte = entry.load();
        if !pte.is_valid() || !pte.is_user() {
            return None;
        }
        Some(pte.ppn().address())
    }

    /// Copies `src` into user memory at `dst`.
    ///
    /// # Errors
    /// Returns `EFAULT` if any touched page is unmapped, paged out, or not
    /// user-accessible; bytes copied before the failing page stay written.
    pub fn copy_out(&self, dst: VirtAddr, mut src: &[u8]) -> SysResult<()> {
        let mut dst = dst.to_usize();
        while !src.is_empty() {
            if dst >= MAX_VA {
                return Err(SysError::EFAULT);
            }
            let va0 = VirtAddr::new(dst).round_down();
            let pa0 = self.user_walk_addr(va0).ok_or(SysError::EFAULT)?;
            let n = min(PAGE_SIZE - (dst - va0.to_usize()), src.len());
            // SAFETY: `pa0` backs a resident user page; `n` stays inside it.
            unsafe {
                ptr::copy_nonoverlapping(
                    src.as_ptr(),
                    (pa0.to_usize() + (dst - va0.to_usize())) as *mut u8,
                    n,
                );
            }
            src = &src[n..];
            dst = va0.to_usize() + PAGE_SIZE;
        }
        Ok(())
    }

    /// Copies user memory at `src` into `dst`.
    ///
    /// # Errors
    /// Returns `EFAULT` if any touched page is unmapped, paged out, or not
    /// user-accessible.
    pub fn copy_in(&self, mut dst: &mut [u8], src: VirtAddr) -> SysResult<()> {
        let mut src = src.to_usize();
        while !dst.is_empty() {
            let va0 = VirtAddr::new(src).round_down();
            let pa0 = self.user_walk_addr(va0).ok_or(SysError::EFAULT)?;
            let n = min(PAGE_SIZE - (src - va0.to_usize()), dst.len());
            let rest = dst;
            let (chunk, rest) = rest.split_at_mut(n);
            // SAFETY: `pa0` backs a resident user page; `n` stays inside it.
            unsafe {
                ptr::copy_nonoverlapping(
                    (pa0.to_usize() + (src - va0.to_usize())) as *const u8,
                    chunk.as_mut_ptr(),
                    n,
                );
            }
            dst = rest;
            src = va0.to_usize() + PAGE_SIZE;
        }
        Ok(())
    }

    /// Copies a NUL-terminated string from user memory at `src` into
    /// `dst`, at most `dst.len()` bytes including the NUL. Returns the
    /// string length.
    ///
    /// # Errors
    /// Returns `EFAULT` on an inaccessible page and `E2BIG` when `dst`
    /// fills up before a NUL is found.
    pub fn copy_in_str(&self, dst: &mut [u8], src: VirtAddr) -> SysResult<usize> {
        let mut src = src.to_usize();
        let mut copied = 0usize;
        while copied < dst.len() {
            let va0 = VirtAddr::new(src).round_down();
            let pa0 = self.user_walk_addr(va0).ok_or(SysError::EFAULT)?;
            let n = min(PAGE_SIZE - (src - va0.to_usize()), dst.len() - copied);
            let base = (pa0.to_usize() + (src - va0.to_usize())) as *const u8;
            // SAFETY: `pa0` backs a resident user page; `n` stays inside it.
            let bytes = unsafe { core::slice::from_raw_parts(base, n) };
            for &byte in bytes {
                dst[copied] = byte;
                if byte == 0 {
                    return Ok(copied);
                }
                copied += 1;
            }
            src = va0.to_usize() + PAGE_SIZE;
        }
        Err(SysError::E2BIG)
    }

    /// Tears the address space down: unmaps the first `size` bytes of
    /// image, freeing frames and discarding backing copies, then frees the
    /// table frames. Any extra mappings the embedder installed (trampoline,
    /// trap frame) must be gone already.
    pub fn destroy(self, size: usize) {
        if size > 0 {
            let npages = VirtAddr::new(size).round_up().to_usize() / PAGE_SIZE;
            self.unmap_range(VirtAddr::new(0), npages, true);
        }
        self.inner.into_inner().table.free_walk();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{self, MemSwap};

    fn space(pid: usize, policy: Policy) -> AddrSpace<MemSwap> {
        test_util::init_frames();
        AddrSpace::build(pid, policy, MemSwap::new()).unwrap()
    }

    fn counter_of(space: &AddrSpace<MemSwap>, va: usize) -> u32 {
        let guard = space.inner.lock();
        let index = guard.resident.find(VirtAddr::new(va)).unwrap();
        guard.resident.get(index).counter
    }

    fn mark_accessed(space: &AddrSpace<MemSwap>, va: usize) {
        let guard = space.inner.lock();
        let mut entry = guard
            .table
            .entry(VirtAddr::new(va).page_number())
            .unwrap();
        let pte = entry.load();
        entry.store(PageTableEntry::new(pte.ppn(), pte.flags() | PteFlags::A));
    }

    #[test]
    fn idle_counters_decay_to_zero() {
        let space = space(3, Policy::Nfua);
        let size = space.grow(0, 2 * PAGE_SIZE).unwrap();

        for _ in 0..32 {
            mark_accessed(&space, PAGE_SIZE);
            space.aging_tick();
        }
        assert_eq!(counter_of(&space, 0), 0);
        assert_eq!(counter_of(&space, PAGE_SIZE), u32::MAX);

        space.destroy(size);
    }

    #[test]
    fn one_access_ages_away_after_32_ticks() {
        let space = space(3, Policy::Nfua);
        let size = space.grow(0, PAGE_SIZE).unwrap();

        mark_accessed(&space, 0);
        space.aging_tick();
        assert_eq!(counter_of(&space, 0), COUNTER_MSB);
        for _ in 0..32 {
            space.aging_tick();
        }
        assert_eq!(counter_of(&space, 0), 0);

        space.destroy(size);
    }

    #[test]
    fn ticks_do_not_consume_accessed_bits_under_scfifo() {
        let space = space(3, Policy::Scfifo);
        let size = space.grow(0, PAGE_SIZE).unwrap();

        mark_accessed(&space, 0);
        space.aging_tick();
        assert!(
            space
                .page_flags(VirtAddr::new(0))
                .unwrap()
                .contains(PteFlags::A)
        );

        space.destroy(size);
    }

    #[test]
    fn bootstrap_pids_are_not_tracked() {
        let space = space(1, Policy::Nfua);
        let size = space
            .grow(0, (MAX_RESIDENT_PAGES + 2) * PAGE_SIZE)
            .unwrap();
        assert_eq!(space.resident_count(), 0);
        assert_eq!(space.swapped_count(), 0);
        space.destroy(size);
    }

    #[test]
    fn policy_none_keeps_no_books() {
        let space = space(3, Policy::None);
        let size = space
            .grow(0, (MAX_RESIDENT_PAGES + 2) * PAGE_SIZE)
            .unwrap();
        assert_eq!(space.resident_count(), 0);
        assert_eq!(space.swapped_count(), 0);
        space.destroy(size);
    }

    #[test]
    fn growth_stops_at_the_paging_budget() {
        let space = space(3, Policy::Nfua);
        let budget = (MAX_RESIDENT_PAGES + MAX_SWAPPED_PAGES) * PAGE_SIZE;
        let size = space.grow(0, budget).unwrap();
        assert_eq!(space.resident_count(), MAX_RESIDENT_PAGES);
        assert_eq!(space.swapped_count(), MAX_SWAPPED_PAGES);

        assert_eq!(space.grow(size, size + PAGE_SIZE), Err(SysError::ENOMEM));
        // the failed call left nothing behind
        assert_eq!(space.resident_count(), MAX_RESIDENT_PAGES);
        assert_eq!(space.swapped_count(), MAX_SWAPPED_PAGES);
        assert!(space.page_flags(VirtAddr::new(size)).is_none());

        space.destroy(size);
    }

    #[test]
    fn faults_are_serviceable_at_full_occupancy() {
        let space = space(3, Policy::Nfua);
        let budget = (MAX_RESIDENT_PAGES + MAX_SWAPPED_PAGES) * PAGE_SIZE;
        let size = space.grow(0, budget).unwrap();

        // every page grown first was evicted by the pages grown last
        let first = VirtAddr::new(0);
        assert!(
            space
                .page_flags(first)
                .unwrap()
                .contains(PteFlags::PG)
        );
        space.fault_load(first).unwrap();
        assert!(space.page_flags(first).unwrap().contains(PteFlags::V));
        assert_eq!(space.resident_count(), MAX_RESIDENT_PAGES);
        assert_eq!(space.swapped_count(), MAX_SWAPPED_PAGES);

        space.destroy(size);
    }

    #[test]
    fn fault_load_rejects_pages_that_are_not_paged_out() {
        let space = space(3, Policy::Nfua);
        let size = space.grow(0, PAGE_SIZE).unwrap();

        // resident page
        assert_eq!(
            space.fault_load(VirtAddr::new(0)),
            Err(SysError::EFAULT)
        );
        // unmapped page
        assert_eq!(
            space.fault_load(VirtAddr::new(64 * PAGE_SIZE)),
            Err(SysError::EFAULT)
        );
        // out of range
        assert_eq!(
            space.fault_load(VirtAddr::new(MAX_VA)),
            Err(SysError::EFAULT)
        );

        space.destroy(size);
    }
}
