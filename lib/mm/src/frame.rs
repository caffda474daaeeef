//! Physical-frame allocator.
//!
//! Frames are page-sized and page-aligned. The allocator hands them out of
//! a physical range ceded by the embedder at boot: the kernel gives it the
//! RAM above its own image, hosted test builds give it an arena on the test
//! heap. Exhaustion is reported as [`ENOMEM`](SysError::ENOMEM), never a
//! panic; callers decide whether an allocation failure is recoverable.
//!
//! A frame is owned by exactly one of: the free pool, a single leaf page
//! table entry, or a page table itself (non-leaf frames). Ownership moves
//! with explicit [`alloc`]/[`dealloc`] calls because a frame's lifetime is
//! not lexical: eviction frees a frame while its page lives on in the
//! backing store.

use bitmap_allocator::{BitAlloc, BitAlloc64K};

use config::mm::PAGE_SIZE;
use mutex::SpinLock;
use systype::{SysError, SysResult};

use crate::address::{PhysAddr, PhysPageNum};

/// Global frame allocator, protected by a lock of its own.
static FRAME_ALLOCATOR: SpinLock<FrameAllocator> = SpinLock::new(FrameAllocator::new());

struct FrameAllocator {
    /// Bitmap allocator over frame indices.
    map: BitAlloc64K,
    /// Offset between PPNs and bit indices.
    offset: usize,
}

impl FrameAllocator {
    const fn new() -> Self {
        FrameAllocator {
            map: BitAlloc64K::DEFAULT,
            offset: 0,
        }
    }
}

/// Cedes the physical range `[base, base + size)` to the allocator.
///
/// # Safety
/// The range must be page-aligned, unused by anything else, and stay valid
/// for the lifetime of the allocator. Must be called exactly once, before
/// the first allocation.
pub unsafe fn init(base: PhysAddr, size: usize) {
    debug_assert_eq!(base.page_offset(), 0, "frame range not aligned");
    let ppn_start = base.page_number().to_usize();
    let ppn_end = PhysAddr::new(base.to_usize() + size).page_number().to_usize();
    let mut allocator = FRAME_ALLOCATOR.lock();
    allocator.offset = ppn_start;
    allocator.map.insert(0..ppn_end - ppn_start);
    log::debug!(
        "frame allocator: {} frames at {:#x}",
        ppn_end - ppn_start,
        base.to_usize()
    );
}

/// Allocates one frame.
///
/// # Errors
/// Returns `ENOMEM` when no free frames remain.
pub fn alloc() -> SysResult<PhysPageNum> {
    let mut allocator = FRAME_ALLOCATOR.lock();
    let offset = allocator.offset;
    allocator
        .map
        .alloc()
        .map(|index| PhysPageNum::new(offset + index))
        .ok_or(SysError::ENOMEM)
}

/// Returns a frame to the free pool.
pub fn dealloc(ppn: PhysPageNum) {
    let mut allocator = FRAME_ALLOCATOR.lock();
    let offset = allocator.offset;
    allocator.map.dealloc(ppn.to_usize() - offset);
}

/// Zeroes the frame.
///
/// # Safety
/// `ppn` must name a frame owned by the caller.
pub unsafe fn zero(ppn: PhysPageNum) {
    unsafe {
        core::ptr::write_bytes(ppn.address().to_usize() as *mut u8, 0, PAGE_SIZE);
    }
}
