//! Replacement policies.
//!
//! A policy decides which resident page leaves memory when the resident set
//! is full, and what aging counter a newly activated page starts with. The
//! policy is chosen when an address space is built; exactly one is active
//! per process.

use crate::tlb;

use super::page_table::PageTable;
use super::pte::{PageTableEntry, PteFlags};
use super::tracking::SlotTable;

/// Victim-selection strategy for the resident set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Not-frequently-used with aging: evict the numerically smallest
    /// counter.
    Nfua,
    /// Least-accessed-page aging: evict the counter with the fewest set
    /// bits, ties broken on the smaller value. Fresh pages start with a
    /// full register so they rank as recently accessed.
    Lapa,
    /// Second-chance FIFO over the resident queue.
    Scfifo,
    /// Paging disabled: growth is bounded by physical memory alone and no
    /// bookkeeping is kept.
    None,
}

impl Policy {
    /// Initial counter for a page entering the resident set.
    pub fn reset_counter(self) -> u32 {
        match self {
            Policy::Lapa => u32::MAX,
            _ => 0,
        }
    }

    /// Whether the aging tick maintains counters for this policy.
    ///
    /// Second-chance FIFO reads and clears the accessed bits itself during
    /// victim selection, so the tick must leave them alone; `None` keeps no
    /// counters at all.
    pub fn uses_aging(self) -> bool {
        matches!(self, Policy::Nfua | Policy::Lapa)
    }

    /// Whether eviction and bookkeeping happen at all.
    pub fn swapping_enabled(self) -> bool {
        self != Policy::None
    }

    /// Picks the victim slot index from the resident set.
    ///
    /// Returns `None` for [`Policy::None`]. For second-chance FIFO this
    /// consumes second chances: an accessed head loses its accessed bit and
    /// requeues at the tail until an unaccessed head is found, which is
    /// then the victim (always index 0).
    pub fn pick_victim(self, resident: &mut SlotTable, table: &PageTable) -> Option<usize> {
        debug_assert!(resident.used_count() > 0, "pick_victim: empty resident set");
        match self {
            Policy::Nfua => {
                let mut min: Option<usize> = None;
                for (index, slot) in resident.iter().enumerate() {
                    if !slot.is_used() {
                        continue;
                    }
                    match min {
                        Some(best) if resident.get(best).counter <= slot.counter => {}
                        _ => min = Some(index),
                    }
                }
                min
            }
            Policy::Lapa => {
                let mut min: Option<usize> = None;
                for (index, slot) in resident.iter().enumerate() {
                    if !slot.is_used() {
                        continue;
                    }
                    let Some(best) = min else {
                        min = Some(index);
                        continue;
                    };
                    let best_counter = resident.get(best).counter;
                    let ones = slot.counter.count_ones();
                    let best_ones = best_counter.count_ones();
                    if ones < best_ones || (ones == best_ones && slot.counter < best_counter) {
                        min = Some(index);
                    }
                }
                min
            }
            Policy::Scfifo => loop {
                if !resident.get(0).is_used() {
                    resident.rotate_left();
                    continue;
                }
                let head_va = resident.get(0).va;
                let mut entry = table
                    .entry(head_va.page_number())
                    .expect("pick_victim: head page has no leaf");
                let pte = entry.load();
                if pte.is_accessed() {
                    // second chance: strip the accessed bit and requeue
                    entry.store(PageTableEntry::new(pte.ppn(), pte.flags() - PteFlags::A));
                    tlb::sfence_vma();
                    resident.rotate_left();
                    continue;
                }
                break Some(0);
            },
            Policy::None => None,
        }
    }
}
