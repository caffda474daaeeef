//! Memory geometry

/// Page size
pub const PAGE_SIZE: usize = 4096;
/// Width of page offset
pub const PAGE_OFFSET_WIDTH: usize = 12;
/// Number of entries in one page table
pub const PTES_PER_TABLE: usize = 512;
/// Width of one page-table index field
pub const PT_INDEX_WIDTH: usize = 9;
/// Number of page-table levels in Sv39
pub const PT_LEVELS: usize = 3;
/// Width of a physical address in Sv39
pub const PA_WIDTH_SV39: usize = 56;
/// Width of a virtual address in Sv39
pub const VA_WIDTH_SV39: usize = 39;
/// Width of a physical page number in Sv39
pub const PPN_WIDTH_SV39: usize = PA_WIDTH_SV39 - PAGE_OFFSET_WIDTH;
/// Width of a virtual page number in Sv39
pub const VPN_WIDTH_SV39: usize = VA_WIDTH_SV39 - PAGE_OFFSET_WIDTH;

/// One beyond the highest user virtual address.
///
/// One bit below the Sv39 ceiling, so user addresses never carry the sign
/// extension required of addresses with bit 38 set.
pub const MAX_VA: usize = 1 << (VA_WIDTH_SV39 - 1);

/// Capacity of the per-process resident-page table.
pub const MAX_RESIDENT_PAGES: usize = 16;

/// Capacity of the per-process swap-slot table. Slot `i` occupies bytes
/// `[i * PAGE_SIZE, (i + 1) * PAGE_SIZE)` of the process's backing store.
pub const MAX_SWAPPED_PAGES: usize = MAX_RESIDENT_PAGES;
