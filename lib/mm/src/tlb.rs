//! TLB maintenance.
//!
//! Invalidations are global on the current hart; there is no ASID
//! management. Every page-table-entry mutation that clears the valid bit or
//! changes flags must be followed by a fence.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "riscv64")] {
        /// Flushes all translations on the current hart.
        pub fn sfence_vma() {
            unsafe {
                riscv::asm::sfence_vma_all();
            }
        }
    } else {
        /// Flushes all translations on the current hart.
        ///
        /// Off-target builds translate through the walker and keep no TLB,
        /// so there is nothing to invalidate.
        pub fn sfence_vma() {}
    }
}
