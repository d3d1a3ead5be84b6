//! # Memory Accounting
//!
//! Storages are sized up front and grow geometrically. The registry reports
//! what its arrays currently hold so callers can pick better capacities.
//!
//! Figures count allocated capacity, not live elements, and exclude the
//! bookkeeping of the locks and the storage map itself.

use std::fmt;

/// Bytes held by a registry, split by owner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    /// Free list and live set of the entity allocator.
    pub entities: usize,
    /// Sum over every component storage.
    pub components: usize,
}

impl MemoryUsage {
    /// Returns the combined byte count.
    #[inline]
    #[must_use]
    pub const fn total(&self) -> usize {
        self.entities + self.components
    }
}

impl fmt::Display for MemoryUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes (entities: {}, components: {})",
            self.total(),
            self.entities,
            self.components
        )
    }
}
