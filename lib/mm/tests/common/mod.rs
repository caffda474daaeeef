//! Shared fixture for the demand-paging tests: a frame arena on the test
//! heap and a memory-backed swap store.

use std::alloc::{Layout, alloc};
use std::sync::{Mutex, Once};

use config::mm::{MAX_SWAPPED_PAGES, PAGE_SIZE};
use systype::SysResult;

use mm::address::{PhysAddr, PhysPageNum, VirtAddr};
use mm::frame;
use mm::vm::addr_space::AddrSpace;
use mm::vm::page_table::PageTable;
use mm::vm::policy::Policy;
use mm::vm::pte::{PageTableEntry, PteFlags};
use mm::vm::swap::SwapBacking;

const ARENA_PAGES: usize = 8192;

static ARENA: Once = Once::new();

/// Hands the frame allocator a heap arena, once per test binary.
pub fn init_frames() {
    ARENA.call_once(|| {
        let layout = Layout::from_size_align(ARENA_PAGES * PAGE_SIZE, PAGE_SIZE).unwrap();
        // SAFETY: the layout is non-zero.
        let base = unsafe { alloc(layout) };
        assert!(!base.is_null());
        // SAFETY: a fresh page-aligned range, ceded to the allocator for
        // the rest of the process.
        unsafe {
            frame::init(PhysAddr::new(base as usize), ARENA_PAGES * PAGE_SIZE);
        }
    });
}

/// Memory-backed stand-in for the per-process swap file.
pub struct MemSwap {
    slots: Mutex<Vec<u8>>,
}

impl MemSwap {
    pub fn new() -> Self {
        MemSwap {
            slots: Mutex::new(vec![0u8; MAX_SWAPPED_PAGES * PAGE_SIZE]),
        }
    }
}

impl SwapBacking for MemSwap {
    fn write_page(&self, src: PhysPageNum, index: usize) -> SysResult<()> {
        let mut slots = self.slots.lock().unwrap();
        let offset = index * PAGE_SIZE;
        // SAFETY: `src` names an allocated frame.
        let bytes = unsafe {
            std::slice::from_raw_parts(src.address().to_usize() as *const u8, PAGE_SIZE)
        };
        slots[offset..offset + PAGE_SIZE].copy_from_slice(bytes);
        Ok(())
    }

    fn read_page(&self, dst: PhysPageNum, index: usize) -> SysResult<()> {
        let slots = self.slots.lock().unwrap();
        let offset = index * PAGE_SIZE;
        // SAFETY: `dst` names an allocated frame.
        let bytes = unsafe {
            std::slice::from_raw_parts_mut(dst.address().to_usize() as *mut u8, PAGE_SIZE)
        };
        bytes.copy_from_slice(&slots[offset..offset + PAGE_SIZE]);
        Ok(())
    }
}

/// Builds a tracked address space.
pub fn user_space(pid: usize, policy: Policy) -> AddrSpace<MemSwap> {
    init_frames();
    AddrSpace::build(pid, policy, MemSwap::new()).unwrap()
}

/// Writes one byte of user memory, taking the fault path if the page is
/// out — what the syscall layer does when a kernel copy reports a bad
/// address.
pub fn write_byte(space: &AddrSpace<MemSwap>, addr: usize, byte: u8) {
    let buf = [byte];
    for _ in 0..2 {
        if space.copy_out(VirtAddr::new(addr), &buf).is_ok() {
            return;
        }
        space.fault_load(VirtAddr::new(addr)).unwrap();
    }
    panic!("write_byte: fault did not resolve at {:#x}", addr);
}

/// Reads one byte of user memory, taking the fault path if the page is
/// out.
pub fn read_byte(space: &AddrSpace<MemSwap>, addr: usize) -> u8 {
    let mut buf = [0u8];
    for _ in 0..2 {
        if space.copy_in(&mut buf, VirtAddr::new(addr)).is_ok() {
            return buf[0];
        }
        space.fault_load(VirtAddr::new(addr)).unwrap();
    }
    panic!("read_byte: fault did not resolve at {:#x}", addr);
}

/// Sets the accessed bit on the leaf mapping `addr`, the way the MMU does
/// on a load or store.
pub fn mark_accessed(space: &AddrSpace<MemSwap>, addr: usize) {
    // SAFETY: the root comes from a live address space and the adopted
    // table is used for entry access only.
    let table = unsafe { PageTable::from_root(space.root()) };
    let mut entry = table
        .entry(VirtAddr::new(addr).page_number())
        .expect("mark_accessed: no leaf");
    let pte = entry.load();
    assert!(pte.is_valid(), "mark_accessed: page not resident");
    entry.store(PageTableEntry::new(pte.ppn(), pte.flags() | PteFlags::A));
}
