//! # Entity Management
//!
//! Entities are lightweight identifiers consisting of:
//! - An index naming a storage slot (low 22 bits)
//! - A version counter for safe slot reuse (high 10 bits)
//!
//! The [`EntityAllocator`] hands identifiers out and takes them back:
//!
//! ```text
//! slot state:  Free -> Allocated -> Free -> Allocated -> ...
//! version:       -        v0         v0        v1
//! ```

use std::fmt;
use std::mem;

use crate::error::{RegistryError, RegistryResult};
use crate::sparse::{next_capacity_size, SparseIndexer, SparseSet};

/// Number of bits holding the slot index.
pub const INDEX_BITS: u32 = 22;

/// Number of bits holding the version.
pub const VERSION_BITS: u32 = 10;

/// Mask selecting the index field. Also the largest index ever issued.
pub const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// Mask selecting the version field (after shifting).
pub const VERSION_MASK: u32 = (1 << VERSION_BITS) - 1;

/// Unique identifier for an entity.
///
/// Two identifiers are equal iff both their index and their version are
/// equal. Identifiers are plain values and mean nothing outside the registry
/// that issued them.
///
/// # Version wraparound
///
/// The version wraps to 0 after `2^VERSION_BITS` reuses of one slot, so an
/// identifier held across that many destroy/create cycles compares equal to
/// the new occupant of its slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u32);

impl EntityId {
    /// Null identifier. Index 0 is never issued, so this is never alive.
    pub const NULL: Self = Self(0);

    /// Creates an entity ID from index and version.
    ///
    /// Both fields are truncated to their bit widths.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, version: u32) -> Self {
        Self((index & INDEX_MASK) | ((version & VERSION_MASK) << INDEX_BITS))
    }

    /// Reinterprets raw bits as an entity ID.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw packed bits.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u32 {
        self.0
    }

    /// Returns the index portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 & INDEX_MASK
    }

    /// Returns the version portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn version(self) -> u32 {
        (self.0 >> INDEX_BITS) & VERSION_MASK
    }

    /// Returns the identifier for the next occupant of this slot.
    #[inline]
    #[must_use]
    pub const fn upgraded(self) -> Self {
        Self::new(self.index(), self.version() + 1)
    }

    /// Checks if this entity ID is the null ID.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == Self::NULL.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index(), self.version())
    }
}

/// Sparse indexer keying entity IDs by slot index.
///
/// Every version of one index maps to the same sparse slot, so a set keyed
/// this way holds at most one version per index. Inserting another version
/// while one is present fails with [`crate::RegistryError::SlotOccupied`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityIdIndexer;

impl SparseIndexer<EntityId> for EntityIdIndexer {
    #[inline]
    fn index(&self, id: &EntityId) -> usize {
        id.index() as usize
    }
}

/// Issues, tracks and recycles entity identifiers.
///
/// # Invariants
///
/// - Every index in `1..=last_index` is either alive or on the free list
/// - The free list always has spare capacity for every alive identifier, so
///   [`EntityAllocator::destroy`] never allocates
#[derive(Clone, Debug)]
pub struct EntityAllocator {
    /// Highest index ever issued. Index 0 is reserved.
    last_index: u32,
    /// Retired identifiers, reused LIFO.
    free: Vec<EntityId>,
    /// Currently alive identifiers.
    alive: SparseSet<EntityId, EntityIdIndexer>,
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an allocator with room for `capacity` live identifiers.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            last_index: 0,
            free: Vec::with_capacity(capacity),
            alive: SparseSet::with_capacity(capacity),
        }
    }

    /// Issues a new identifier.
    ///
    /// Reuses the most recently retired slot with its version bumped, or
    /// else takes the next never-used index at version 0.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::IndexSpaceExhausted`] once all `INDEX_MASK`
    /// indices are in use and none are free.
    pub fn create(&mut self) -> RegistryResult<EntityId> {
        if let Some(retired) = self.free.pop() {
            let id = retired.upgraded();
            if let Err(err) = self.alive.insert(id) {
                self.free.push(retired);
                return Err(err);
            }
            return Ok(id);
        }

        if self.last_index >= INDEX_MASK {
            return Err(RegistryError::IndexSpaceExhausted);
        }

        // The free list is empty here, so the live count equals last_index.
        if self.free.capacity() <= self.alive.len() {
            let target = next_capacity_size(
                self.free.capacity(),
                self.alive.len() + 1,
                INDEX_MASK as usize,
            )?;
            self.free.reserve_exact(target);
        }

        let id = EntityId::new(self.last_index + 1, 0);
        self.alive.insert(id)?;
        self.last_index += 1;
        Ok(id)
    }

    /// Retires `id`, making its slot available for reuse.
    ///
    /// Returns `false` if `id` is not alive. Never allocates.
    pub fn destroy(&mut self, id: EntityId) -> bool {
        if !self.alive.unordered_erase(&id) {
            return false;
        }
        debug_assert!(self.free.len() < self.free.capacity());
        self.free.push(id);
        true
    }

    /// Checks whether `id` is currently alive.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.alive.has(&id)
    }

    /// Returns the number of alive identifiers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.alive.len()
    }

    /// Returns `true` if no identifier is alive.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alive.is_empty()
    }

    /// Returns the number of retired identifiers waiting for reuse.
    #[inline]
    #[must_use]
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Returns the alive identifiers in dense order.
    #[inline]
    #[must_use]
    pub fn alive(&self) -> &[EntityId] {
        self.alive.as_slice()
    }

    /// Returns the bytes held by the free list and the live set.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.free.capacity() * mem::size_of::<EntityId>() + self.alive.memory_usage()
    }
}
