//! Memory permissions.

use bitflags::bitflags;

use super::pte::PteFlags;

bitflags! {
    /// Memory permission corresponding to the R, W, X, and U bits of a page
    /// table entry.
    ///
    /// The bits are a subset of [`PteFlags`] at the same positions, so the
    /// conversion is a truncation. Do not set unknown bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemPerm: u16 {
        const R = 1 << 1;
        const W = 1 << 2;
        const X = 1 << 3;
        const U = 1 << 4;
    }
}

impl From<MemPerm> for PteFlags {
    fn from(perm: MemPerm) -> Self {
        PteFlags::from_bits_truncate(perm.bits())
    }
}
