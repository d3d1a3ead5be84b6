//! # Sparse Map
//!
//! Key to value storage composed from a [`SparseSet`] of keys and a parallel
//! dense vector of values. Key `k` at dense position `i` owns `values[i]`.

use std::mem;

use super::{SparseIndexer, SparseSet, UnsignedIndexer};
use crate::error::RegistryResult;

/// Packed key/value store with O(1) insert, unordered erase and lookup.
///
/// Keys and values share positional indexing at every observable point:
/// erasure swaps the value with the last one before the key set performs the
/// same swap.
#[derive(Clone, Debug)]
pub struct SparseMap<K, T, I = UnsignedIndexer> {
    /// Keys, positionally aligned with `values`.
    keys: SparseSet<K, I>,
    /// Values in dense order.
    values: Vec<T>,
}

impl<K, T, I: Default> Default for SparseMap<K, T, I> {
    fn default() -> Self {
        Self {
            keys: SparseSet::default(),
            values: Vec::new(),
        }
    }
}

impl<K, T, I> SparseMap<K, T, I>
where
    K: PartialEq,
    I: SparseIndexer<K>,
{
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self
    where
        I: Default,
    {
        Self::default()
    }

    /// Creates an empty map with a custom key indexer.
    #[must_use]
    pub fn with_indexer(indexer: I) -> Self {
        Self {
            keys: SparseSet::with_indexer(indexer),
            values: Vec::new(),
        }
    }

    /// Creates an empty map with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self
    where
        I: Default,
    {
        Self {
            keys: SparseSet::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Inserts `value` under `key` unless the key is already present.
    ///
    /// Returns the stored value and whether an insertion happened. On the
    /// existing-key path `value` is dropped and the old value is returned.
    ///
    /// # Errors
    ///
    /// Propagates key insertion failures from [`SparseSet::insert`]. The
    /// value push is rolled back first, so the map is unchanged.
    pub fn insert(&mut self, key: K, value: T) -> RegistryResult<(&mut T, bool)> {
        if let Some(position) = self.keys.find_dense_index(&key) {
            return Ok((&mut self.values[position], false));
        }
        self.push_entry(key, value)
    }

    /// Inserts `value` under `key`, overwriting any previous value in place.
    ///
    /// Returns the stored value and whether a new entry was created.
    ///
    /// # Errors
    ///
    /// Same as [`SparseMap::insert`].
    pub fn insert_or_assign(&mut self, key: K, value: T) -> RegistryResult<(&mut T, bool)> {
        if let Some(position) = self.keys.find_dense_index(&key) {
            let slot = &mut self.values[position];
            *slot = value;
            return Ok((slot, false));
        }
        self.push_entry(key, value)
    }

    /// Appends a new entry, undoing the value push if the key cannot be stored.
    fn push_entry(&mut self, key: K, value: T) -> RegistryResult<(&mut T, bool)> {
        self.values.push(value);
        if let Err(err) = self.keys.insert(key) {
            self.values.pop();
            return Err(err);
        }
        let last = self.values.len() - 1;
        Ok((&mut self.values[last], true))
    }

    /// Removes the entry for `key`, moving the last entry into its place.
    ///
    /// Returns `false` if the key was not present.
    pub fn unordered_erase(&mut self, key: &K) -> bool {
        let Some(position) = self.keys.find_dense_index(key) else {
            return false;
        };
        self.values.swap_remove(position);
        self.keys.unordered_erase(key);
        true
    }

    /// Removes every entry. Allocated capacity is kept.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.values.clear();
    }

    /// Checks whether `key` is present.
    #[inline]
    #[must_use]
    pub fn has(&self, key: &K) -> bool {
        self.keys.has(key)
    }

    /// Returns the value for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ValueNotFound`](crate::RegistryError::ValueNotFound)
    /// if the key is absent.
    pub fn get(&self, key: &K) -> RegistryResult<&T> {
        let position = self.keys.dense_index(key)?;
        Ok(&self.values[position])
    }

    /// Returns the value for `key` mutably.
    ///
    /// # Errors
    ///
    /// Same as [`SparseMap::get`].
    pub fn get_mut(&mut self, key: &K) -> RegistryResult<&mut T> {
        let position = self.keys.dense_index(key)?;
        Ok(&mut self.values[position])
    }

    /// Returns the value for `key`, if present.
    #[inline]
    #[must_use]
    pub fn find(&self, key: &K) -> Option<&T> {
        self.keys
            .find_dense_index(key)
            .map(|position| &self.values[position])
    }

    /// Returns the value for `key` mutably, if present.
    #[inline]
    pub fn find_mut(&mut self, key: &K) -> Option<&mut T> {
        let position = self.keys.find_dense_index(key)?;
        Some(&mut self.values[position])
    }

    /// Returns the dense position of `key`, if present.
    #[inline]
    #[must_use]
    pub fn find_dense_index(&self, key: &K) -> Option<usize> {
        self.keys.find_dense_index(key)
    }

    /// Reserves room for `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        self.keys.reserve(additional);
        self.values.reserve(additional);
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the map has no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the length of the key set's sparse index array.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.keys.capacity()
    }

    /// Returns the keys in dense order.
    #[inline]
    #[must_use]
    pub fn keys(&self) -> &[K] {
        self.keys.as_slice()
    }

    /// Returns the values in dense order.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Returns the values in dense order, mutably.
    #[inline]
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Iterates over `(key, value)` pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &T)> {
        self.keys.iter().zip(self.values.iter())
    }

    /// Iterates over `(key, value)` pairs in dense order with mutable values.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut T)> {
        self.keys.iter().zip(self.values.iter_mut())
    }

    /// Returns the bytes held by the key set and the value array.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.keys.memory_usage() + self.values.capacity() * mem::size_of::<T>()
    }
}
