//! Shared helpers for unit tests.

use std::alloc::{Layout, alloc};
use std::sync::{Mutex, Once};

use config::mm::{MAX_SWAPPED_PAGES, PAGE_SIZE};
use systype::SysResult;

use crate::address::{PhysAddr, PhysPageNum};
use crate::frame;
use crate::vm::swap::SwapBacking;

const ARENA_PAGES: usize = 4096;

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
            core::slice::from_raw_parts(src.address().to_usize() as *const u8, PAGE_SIZE)
        };
        slots[offset..offset + PAGE_SIZE].copy_from_slice(bytes);
        Ok(())
    }

    fn read_page(&self, dst: PhysPageNum, index: usize) -> SysResult<()> {
        let slots = self.slots.lock().unwrap();
        let offset = index * PAGE_SIZE;
        // SAFETY: `dst` names an allocated frame.
        let bytes = unsafe {
            core::slice::from_raw_parts_mut(dst.address().to_usize() as *mut u8, PAGE_SIZE)
        };
        bytes.copy_from_slice(&slots[offset..offset + PAGE_SIZE]);
        Ok(())
    }
}
