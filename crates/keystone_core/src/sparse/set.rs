//! # Sparse Set
//!
//! A packed set of values with O(1) insert, unordered erase and lookup.

use std::mem;

use super::{next_capacity_size, SparseIndexer, UnsignedIndexer, MAX_SPARSE_LEN};
use crate::error::{RegistryError, RegistryResult};

/// Set of values backed by a dense packed array and a sparse index array.
///
/// # Invariants
///
/// - `dense` has no gaps; its length is the number of members
/// - `v` is a member iff `sparse[idx(v)]` points at a dense slot holding `v`
/// - At most one member maps to any sparse slot
///
/// # Example
///
/// ```rust,ignore
/// let mut set: SparseSet<u32> = SparseSet::new();
/// set.insert(42)?;
/// assert!(set.has(&42));
/// assert!(set.unordered_erase(&42));
/// ```
#[derive(Clone, Debug)]
pub struct SparseSet<V, I = UnsignedIndexer> {
    /// Maps values to sparse slots.
    indexer: I,
    /// Packed members, in iteration order.
    dense: Vec<V>,
    /// Dense position of each member, addressed by `indexer`.
    sparse: Vec<usize>,
}

impl<V, I: Default> Default for SparseSet<V, I> {
    fn default() -> Self {
        Self {
            indexer: I::default(),
            dense: Vec::new(),
            sparse: Vec::new(),
        }
    }
}

impl<V, I> SparseSet<V, I>
where
    V: PartialEq,
    I: SparseIndexer<V>,
{
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self
    where
        I: Default,
    {
        Self::default()
    }

    /// Creates an empty set with a custom indexer.
    #[must_use]
    pub fn with_indexer(indexer: I) -> Self {
        Self {
            indexer,
            dense: Vec::new(),
            sparse: Vec::new(),
        }
    }

    /// Creates an empty set with room for `capacity` members in the dense array.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self
    where
        I: Default,
    {
        Self {
            indexer: I::default(),
            dense: Vec::with_capacity(capacity),
            sparse: Vec::new(),
        }
    }

    /// Inserts `value`.
    ///
    /// Returns `Ok(false)` without touching the set if the value is already
    /// present. The sparse array grows by doubling, never below what the new
    /// value needs.
    ///
    /// # Errors
    ///
    /// The set is unchanged on error.
    ///
    /// - [`RegistryError::SlotOccupied`] if another member maps to the same
    ///   sparse slot
    /// - [`RegistryError::InvalidCapacityRange`] if the value's sparse slot
    ///   lies beyond [`MAX_SPARSE_LEN`]
    pub fn insert(&mut self, value: V) -> RegistryResult<bool> {
        let slot = self.indexer.index(&value);
        if let Some(member) = self.sparse.get(slot).and_then(|&p| self.dense.get(p)) {
            if *member == value {
                return Ok(false);
            }
            if self.indexer.index(member) == slot {
                return Err(RegistryError::SlotOccupied);
            }
        }
        if slot >= self.sparse.len() {
            let len = next_capacity_size(
                self.sparse.len(),
                slot.saturating_add(1),
                MAX_SPARSE_LEN,
            )?;
            self.sparse.resize(len, 0);
        }
        self.dense.push(value);
        self.sparse[slot] = self.dense.len() - 1;
        Ok(true)
    }

    /// Removes `value` by swapping it with the last dense member.
    ///
    /// Returns `false` if the value was not present.
    pub fn unordered_erase(&mut self, value: &V) -> bool {
        let Some(position) = self.find_dense_index(value) else {
            return false;
        };
        let last = self.dense.len() - 1;
        if position != last {
            self.dense.swap(position, last);
            let moved = self.indexer.index(&self.dense[position]);
            self.sparse[moved] = position;
        }
        self.dense.pop();
        true
    }

    /// Removes every member. Allocated capacity is kept.
    #[inline]
    pub fn clear(&mut self) {
        self.dense.clear();
    }

    /// Checks whether `value` is a member.
    #[inline]
    #[must_use]
    pub fn has(&self, value: &V) -> bool {
        self.find_dense_index(value).is_some()
    }

    /// Returns the dense position of `value`, or `None` if it is absent.
    #[inline]
    #[must_use]
    pub fn find_dense_index(&self, value: &V) -> Option<usize> {
        let position = *self.sparse.get(self.indexer.index(value))?;
        match self.dense.get(position) {
            Some(member) if member == value => Some(position),
            _ => None,
        }
    }

    /// Returns the dense position of `value`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ValueNotFound`] if the value is absent.
    pub fn dense_index(&self, value: &V) -> RegistryResult<usize> {
        self.find_dense_index(value)
            .ok_or(RegistryError::ValueNotFound)
    }

    /// Reserves room for `additional` more members in the dense array.
    pub fn reserve(&mut self, additional: usize) {
        self.dense.reserve(additional);
    }

    /// Returns the number of members.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Returns `true` if the set has no members.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Returns the length of the sparse index array.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.sparse.len()
    }

    /// Returns the members in dense order.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[V] {
        &self.dense
    }

    /// Iterates over the members in dense order.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.dense.iter()
    }

    /// Returns the bytes held by both arrays.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.dense.capacity() * mem::size_of::<V>()
            + self.sparse.capacity() * mem::size_of::<usize>()
    }
}

impl<'a, V, I> IntoIterator for &'a SparseSet<V, I>
where
    V: PartialEq,
    I: SparseIndexer<V>,
{
    type Item = &'a V;
    type IntoIter = std::slice::Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
