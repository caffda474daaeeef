//! End-to-end scenarios for the demand-paging engine, driven the way the
//! syscall and trap layers drive it: kernel copies report a bad address for
//! a non-resident page and the caller takes the fault path before retrying.

mod common;

use common::{MemSwap, mark_accessed, read_byte, user_space, write_byte};

use config::mm::{MAX_RESIDENT_PAGES, MAX_SWAPPED_PAGES, PAGE_SIZE};
use mm::address::VirtAddr;
use mm::vm::addr_space::AddrSpace;
use mm::vm::policy::Policy;
use mm::vm::pte::PteFlags;
use systype::SysError;

fn page_byte(page: usize) -> u8 {
    (page as u8).wrapping_mul(7).wrapping_add(3)
}

fn flags_of(space: &AddrSpace<MemSwap>, page: usize) -> PteFlags {
    space
        .page_flags(VirtAddr::new(page * PAGE_SIZE))
        .expect("page should be mapped")
}

#[test]
fn sparse_write_read_round_trip() {
    let space = user_space(3, Policy::Lapa);
    let pages = 8;
    let size = space.grow(0, pages * PAGE_SIZE).unwrap();

    // one pointer-sized value at the start of every page
    for page in 0..pages {
        let value = (page * PAGE_SIZE) as u64;
        space
            .copy_out(VirtAddr::new(page * PAGE_SIZE), &value.to_le_bytes())
            .unwrap();
    }
    for page in 0..pages {
        let mut buf = [0u8; 8];
        space
            .copy_in(&mut buf, VirtAddr::new(page * PAGE_SIZE))
            .unwrap();
        assert_eq!(u64::from_le_bytes(buf), (page * PAGE_SIZE) as u64);
    }

    // fresh pages arrive zeroed
    let mut buf = [0xFFu8; 16];
    space
        .copy_in(&mut buf, VirtAddr::new(3 * PAGE_SIZE + 100))
        .unwrap();
    assert_eq!(buf, [0u8; 16]);

    space.destroy(size);
}

#[test]
fn forced_eviction_round_trip() {
    let space = user_space(3, Policy::Lapa);
    let pages = MAX_RESIDENT_PAGES + 4;
    let size = space.grow(0, pages * PAGE_SIZE).unwrap();

    // growth past the resident budget paged the oldest pages out
    assert_eq!(space.resident_count(), MAX_RESIDENT_PAGES);
    assert_eq!(space.swapped_count(), 4);

    for page in 0..pages {
        write_byte(&space, page * PAGE_SIZE + 5, page_byte(page));
    }
    for page in (0..pages).rev() {
        assert_eq!(read_byte(&space, page * PAGE_SIZE + 5), page_byte(page));
    }

    // the budget held throughout
    assert_eq!(space.resident_count(), MAX_RESIDENT_PAGES);
    assert_eq!(space.swapped_count(), 4);

    space.destroy(size);
}

#[test]
fn full_occupancy_round_trip() {
    let space = user_space(3, Policy::Nfua);
    let pages = MAX_RESIDENT_PAGES + MAX_SWAPPED_PAGES;
    let size = space.grow(0, pages * PAGE_SIZE).unwrap();
    assert_eq!(space.swapped_count(), MAX_SWAPPED_PAGES);

    // every access below forces an eviction into the slot just vacated
    for page in 0..pages {
        write_byte(&space, page * PAGE_SIZE, page_byte(page));
    }
    for page in (0..pages).rev() {
        assert_eq!(read_byte(&space, page * PAGE_SIZE), page_byte(page));
    }

    assert_eq!(space.resident_count(), MAX_RESIDENT_PAGES);
    assert_eq!(space.swapped_count(), MAX_SWAPPED_PAGES);

    space.destroy(size);
}

#[test]
fn fork_preserves_flags_and_data() {
    let parent = user_space(3, Policy::Lapa);
    let pages = MAX_RESIDENT_PAGES + 4;
    let size = parent.grow(0, pages * PAGE_SIZE).unwrap();
    for page in 0..pages {
        write_byte(&parent, page * PAGE_SIZE + 1, page_byte(page));
    }

    let child = user_space(4, Policy::Lapa);
    parent.fork_into(&child, size).unwrap();

    // the child shows the same per-page flag pattern as the parent
    for page in 0..pages {
        assert_eq!(flags_of(&parent, page), flags_of(&child, page), "page {}", page);
    }
    assert_eq!(child.resident_count(), parent.resident_count());
    assert_eq!(child.swapped_count(), parent.swapped_count());

    // paged-out pages were copied through the backing store, so the child
    // faults them in from its own store with the parent's data
    for page in 0..pages {
        assert_eq!(read_byte(&child, page * PAGE_SIZE + 1), page_byte(page));
    }

    // the copies are independent
    write_byte(&parent, PAGE_SIZE + 1, 0x11);
    assert_eq!(read_byte(&child, PAGE_SIZE + 1), page_byte(1));
    write_byte(&child, 2 * PAGE_SIZE + 1, 0x22);
    assert_eq!(read_byte(&parent, 2 * PAGE_SIZE + 1), page_byte(2));

    child.destroy(size);
    parent.destroy(size);
}

#[test]
fn fork_then_shrink_isolates_the_parent() {
    let parent = user_space(3, Policy::Scfifo);
    let size = parent.grow(0, 2 * PAGE_SIZE).unwrap();
    write_byte(&parent, PAGE_SIZE, 0xAA);

    let child = user_space(4, Policy::Scfifo);
    parent.fork_into(&child, size).unwrap();

    // the child gives the region back; its accesses must now fault hard
    let child_size = child.shrink(size, 0);
    assert_eq!(child_size, 0);
    let mut buf = [0u8];
    assert_eq!(
        child.copy_in(&mut buf, VirtAddr::new(PAGE_SIZE)),
        Err(SysError::EFAULT)
    );
    assert_eq!(
        child.fault_load(VirtAddr::new(PAGE_SIZE)),
        Err(SysError::EFAULT)
    );

    // the parent's page is untouched
    assert_eq!(read_byte(&parent, PAGE_SIZE), 0xAA);

    child.destroy(0);
    parent.destroy(size);
}

#[test]
fn scfifo_grants_second_chances() {
    let space = user_space(3, Policy::Scfifo);
    let pages = MAX_RESIDENT_PAGES;
    let size = space.grow(0, pages * PAGE_SIZE).unwrap();

    // touch the queue head; the next eviction must spare it
    mark_accessed(&space, 0);
    let size = space.grow(size, size + PAGE_SIZE).unwrap();

    assert!(flags_of(&space, 0).contains(PteFlags::V), "head was spared");
    assert!(
        flags_of(&space, 1).contains(PteFlags::PG),
        "the page behind the head was evicted"
    );
    // the spared head lost its accessed bit
    assert!(!flags_of(&space, 0).contains(PteFlags::A));

    space.destroy(size);
}

#[test]
fn scfifo_evicts_the_head_without_a_second_chance() {
    let space = user_space(3, Policy::Scfifo);
    let pages = MAX_RESIDENT_PAGES;
    let size = space.grow(0, pages * PAGE_SIZE).unwrap();

    let size = space.grow(size, size + PAGE_SIZE).unwrap();
    assert!(flags_of(&space, 0).contains(PteFlags::PG));
    assert!(flags_of(&space, 1).contains(PteFlags::V));

    space.destroy(size);
}

#[test]
fn nfua_evicts_the_idle_page() {
    let space = user_space(3, Policy::Nfua);
    let pages = MAX_RESIDENT_PAGES;
    let size = space.grow(0, pages * PAGE_SIZE).unwrap();

    // page 3 stays hot for 32 ticks; everything else idles to zero
    for _ in 0..32 {
        mark_accessed(&space, 3 * PAGE_SIZE);
        space.aging_tick();
    }
    let size = space.grow(size, size + PAGE_SIZE).unwrap();

    assert!(flags_of(&space, 3).contains(PteFlags::V), "hot page stayed");
    assert!(
        flags_of(&space, 0).contains(PteFlags::PG),
        "an idle page was evicted"
    );

    space.destroy(size);
}

#[test]
fn lapa_evicts_the_least_accessed_page() {
    let space = user_space(3, Policy::Lapa);
    let pages = MAX_RESIDENT_PAGES;
    let size = space.grow(0, pages * PAGE_SIZE).unwrap();

    // half the ticks touch page 5, one lone tick touches page 6; sixteen
    // ticks halve everyone's register, so the untouched pages end with the
    // fewest set bits
    for tick in 0..16 {
        if tick % 2 == 0 {
            mark_accessed(&space, 5 * PAGE_SIZE);
        }
        if tick == 0 {
            mark_accessed(&space, 6 * PAGE_SIZE);
        }
        space.aging_tick();
    }
    let size = space.grow(size, size + PAGE_SIZE).unwrap();

    assert!(flags_of(&space, 5).contains(PteFlags::V), "hot page stayed");
    assert!(
        flags_of(&space, 6).contains(PteFlags::V),
        "one access outranks none"
    );
    assert!(
        flags_of(&space, 0).contains(PteFlags::PG),
        "an untouched page was evicted"
    );

    space.destroy(size);
}

#[test]
fn copy_in_str_crosses_page_boundaries() {
    let space = user_space(3, Policy::Nfua);
    let size = space.grow(0, 2 * PAGE_SIZE).unwrap();

    let text = b"crossing the page boundary\0";
    let start = PAGE_SIZE - 8;
    space.copy_out(VirtAddr::new(start), text).unwrap();

    let mut buf = [0u8; 64];
    let len = space.copy_in_str(&mut buf, VirtAddr::new(start)).unwrap();
    assert_eq!(len, text.len() - 1);
    assert_eq!(&buf[..len], &text[..len]);

    space.destroy(size);
}

#[test]
fn copy_in_str_without_a_terminator_fails() {
    let space = user_space(3, Policy::Nfua);
    let size = space.grow(0, PAGE_SIZE).unwrap();

    space
        .copy_out(VirtAddr::new(0), &[b'x'; 32])
        .unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(
        space.copy_in_str(&mut buf, VirtAddr::new(0)),
        Err(SysError::E2BIG)
    );

    // an unmapped source is a bad address, not an overflow
    let mut buf = [0u8; 16];
    assert_eq!(
        space.copy_in_str(&mut buf, VirtAddr::new(40 * PAGE_SIZE)),
        Err(SysError::EFAULT)
    );

    space.destroy(size);
}

#[test]
fn unmap_discards_resident_and_swapped_tracking() {
    let space = user_space(3, Policy::Lapa);
    let pages = MAX_RESIDENT_PAGES + 4;
    let size = space.grow(0, pages * PAGE_SIZE).unwrap();
    assert_eq!(space.swapped_count(), 4);

    let size = space.shrink(size, 0);
    assert_eq!(size, 0);
    assert_eq!(space.resident_count(), 0);
    assert_eq!(space.swapped_count(), 0);
    assert!(space.page_flags(VirtAddr::new(0)).is_none());

    space.destroy(size);
}

#[test]
fn guard_pages_reject_user_access() {
    let space = user_space(3, Policy::Nfua);
    let size = space.grow(0, 2 * PAGE_SIZE).unwrap();

    space.clear_user(VirtAddr::new(0));
    let mut buf = [0u8];
    assert_eq!(
        space.copy_in(&mut buf, VirtAddr::new(16)),
        Err(SysError::EFAULT)
    );
    // the guard page is resident, so the fault path refuses it too
    assert_eq!(space.fault_load(VirtAddr::new(16)), Err(SysError::EFAULT));
    // the page above the guard still works
    write_byte(&space, PAGE_SIZE, 0x5C);
    assert_eq!(read_byte(&space, PAGE_SIZE), 0x5C);

    space.destroy(size);
}

#[test]
fn load_initial_installs_the_bootstrap_image() {
    let space = user_space(1, Policy::Nfua);
    let code = [0x13u8, 0x05, 0x00, 0x00, 0x73, 0x00, 0x00, 0x00];
    space.load_initial(&code).unwrap();

    let mut buf = [0u8; 8];
    space.copy_in(&mut buf, VirtAddr::new(0)).unwrap();
    assert_eq!(buf, code);

    let flags = space.page_flags(VirtAddr::new(0)).unwrap();
    assert!(flags.contains(PteFlags::V | PteFlags::U));
    assert!(flags.contains(PteFlags::X));

    space.destroy(PAGE_SIZE);
}
