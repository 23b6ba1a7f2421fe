//! CPU identifiers.
//!
//! Per-CPU state throughout the core is kept in fixed arrays of
//! [`CPU_MAX`] slots indexed by [`CpuId`]. The platform reports how many
//! of those slots are actually populated.

use core::fmt;

/// Maximum number of CPUs supported by the per-CPU arrays.
pub const CPU_MAX: usize = 8;

/// Identifier of one CPU, always below [`CPU_MAX`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CpuId(u8);

impl CpuId {
    /// The boot CPU. Holds the tick-owner role (see the timer gate).
    pub const BOOT: CpuId = CpuId(0);

    /// Create a CPU id from an array index.
    ///
    /// # Returns
    ///
    /// `None` if `index` does not fit the per-CPU arrays.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<CpuId> {
        if index < CPU_MAX {
            Some(CpuId(index as u8))
        } else {
            None
        }
    }

    /// Index into per-CPU arrays.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether this CPU is the boot CPU.
    #[inline]
    #[must_use]
    pub const fn is_boot(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu{}", self.0)
    }
}
