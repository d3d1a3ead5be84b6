//! # Component Storage
//!
//! One storage per component type, keyed by entity identifier:
//!
//! ```text
//! Position storage:  keys   [e3, e1, e7]      <- sparse set of entity ids
//!                    values [P3, P1, P7]      <- packed, same positions
//!
//! Frozen storage:    keys   [e1, e7]          <- marker: ids only
//!                    placeholder: Frozen      <- shared by every entity
//! ```
//!
//! Each storage sits behind its own reader/writer lock. Mutations take the
//! write side; lookups and iteration take the (recursive) read side so a
//! reader already holding the lock can probe it again.

use std::any::{type_name, Any};
use std::mem;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::component::{is_marker, Component};
use super::entity::{EntityId, EntityIdIndexer};
use super::family::FamilyId;
use crate::error::{RegistryError, RegistryResult};
use crate::sparse::{SparseMap, SparseSet};

/// The records of one component type.
#[derive(Debug)]
pub(crate) enum Records<T> {
    /// One value per entity.
    Dense(SparseMap<EntityId, T, EntityIdIndexer>),
    /// Presence only, for zero-size types.
    Marker {
        /// Entities carrying the marker.
        members: SparseSet<EntityId, EntityIdIndexer>,
        /// Value handed out for every member. Set by the first assignment.
        placeholder: Option<T>,
    },
}

impl<T: Component> Records<T> {
    fn with_capacity(capacity: usize) -> Self {
        if is_marker::<T>() {
            Self::Marker {
                members: SparseSet::with_capacity(capacity),
                placeholder: None,
            }
        } else {
            Self::Dense(SparseMap::with_capacity(capacity))
        }
    }

    fn assign(&mut self, id: EntityId, value: T) -> RegistryResult<bool> {
        match self {
            Self::Dense(map) => Ok(map.insert_or_assign(id, value)?.1),
            Self::Marker { members, placeholder } => {
                let inserted = members.insert(id)?;
                if placeholder.is_none() {
                    *placeholder = Some(value);
                }
                Ok(inserted)
            }
        }
    }

    fn ensure(&mut self, id: EntityId, make: impl FnOnce() -> T) -> RegistryResult<bool> {
        if self.has(id) {
            return Ok(false);
        }
        self.assign(id, make())
    }

    fn remove(&mut self, id: EntityId) -> bool {
        match self {
            Self::Dense(map) => map.unordered_erase(&id),
            Self::Marker { members, .. } => members.unordered_erase(&id),
        }
    }

    fn clear(&mut self) -> usize {
        let count = self.len();
        match self {
            Self::Dense(map) => map.clear(),
            Self::Marker { members, .. } => members.clear(),
        }
        count
    }

    pub(crate) fn has(&self, id: EntityId) -> bool {
        match self {
            Self::Dense(map) => map.has(&id),
            Self::Marker { members, .. } => members.has(&id),
        }
    }

    pub(crate) fn find(&self, id: EntityId) -> Option<&T> {
        match self {
            Self::Dense(map) => map.find(&id),
            Self::Marker { members, placeholder } => {
                if members.has(&id) {
                    placeholder.as_ref()
                } else {
                    None
                }
            }
        }
    }

    pub(crate) fn find_mut(&mut self, id: EntityId) -> Option<&mut T> {
        match self {
            Self::Dense(map) => map.find_mut(&id),
            Self::Marker { members, placeholder } => {
                if members.has(&id) {
                    placeholder.as_mut()
                } else {
                    None
                }
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Dense(map) => map.len(),
            Self::Marker { members, .. } => members.len(),
        }
    }

    /// Entity ids in dense order.
    pub(crate) fn ids(&self) -> &[EntityId] {
        match self {
            Self::Dense(map) => map.keys(),
            Self::Marker { members, .. } => members.as_slice(),
        }
    }

    /// Visits every record in dense order.
    pub(crate) fn for_each(&self, mut f: impl FnMut(EntityId, &T)) {
        match self {
            Self::Dense(map) => {
                for (id, value) in map.iter() {
                    f(*id, value);
                }
            }
            Self::Marker { members, placeholder } => {
                if let Some(value) = placeholder {
                    for id in members {
                        f(*id, value);
                    }
                }
            }
        }
    }

    /// Visits every record in dense order, mutably.
    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(EntityId, &mut T)) {
        match self {
            Self::Dense(map) => {
                for (id, value) in map.iter_mut() {
                    f(*id, value);
                }
            }
            Self::Marker { members, placeholder } => {
                if let Some(value) = placeholder {
                    for id in members.iter() {
                        f(*id, &mut *value);
                    }
                }
            }
        }
    }

    fn memory_usage(&self) -> usize {
        match self {
            Self::Dense(map) => map.memory_usage(),
            Self::Marker { members, .. } => members.memory_usage() + mem::size_of::<Option<T>>(),
        }
    }
}

/// Pre-sized, lock-guarded storage for a single component type.
///
/// # Type Parameters
///
/// * `T` - The component type to store
///
/// # Example
///
/// ```rust,ignore
/// let storage: ComponentStorage<Position> = ComponentStorage::new(1, 256);
/// storage.assign(id, Position { x: 1, y: 2 })?;
/// assert_eq!(storage.find(id), Some(Position { x: 1, y: 2 }));
/// ```
#[derive(Debug)]
pub struct ComponentStorage<T: Component> {
    /// Family id this storage is registered under.
    family: FamilyId,
    /// The records, guarded independently of every other storage.
    records: RwLock<Records<T>>,
}

impl<T: Component> ComponentStorage<T> {
    /// Creates an empty storage with room for `capacity` records.
    #[must_use]
    pub fn new(family: FamilyId, capacity: usize) -> Self {
        Self {
            family,
            records: RwLock::new(Records::with_capacity(capacity)),
        }
    }

    /// Returns the family id of this storage.
    #[inline]
    #[must_use]
    pub fn family(&self) -> FamilyId {
        self.family
    }

    /// Attaches `value` to `id`, replacing any existing record in place.
    ///
    /// Returns `true` if a new record was created.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::SlotOccupied`] if another version of the
    /// same index holds a record, and propagates sparse array growth
    /// failures. Neither happens for identifiers alive in a registry.
    pub fn assign(&self, id: EntityId, value: T) -> RegistryResult<bool> {
        self.records.write().assign(id, value)
    }

    /// Attaches `make()` to `id` unless a record already exists, and returns
    /// a copy of the record now stored.
    ///
    /// `make` is not called on the existing-record path.
    ///
    /// # Errors
    ///
    /// Same as [`ComponentStorage::assign`].
    pub fn ensure(&self, id: EntityId, make: impl FnOnce() -> T) -> RegistryResult<T> {
        let mut records = self.write();
        records.ensure(id, make)?;
        records.find(id).cloned().ok_or(RegistryError::ComponentNotFound)
    }

    /// Removes the record of `id`. Returns whether one existed.
    pub fn remove(&self, id: EntityId) -> bool {
        self.records.write().remove(id)
    }

    /// Removes every record. Returns how many there were.
    pub fn remove_all(&self) -> usize {
        self.records.write().clear()
    }

    /// Checks whether `id` has a record.
    #[must_use]
    pub fn exists(&self, id: EntityId) -> bool {
        self.read().has(id)
    }

    /// Returns a copy of the record of `id`, if any.
    #[must_use]
    pub fn find(&self, id: EntityId) -> Option<T> {
        self.read().find(id).cloned()
    }

    /// Returns a copy of the record of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ComponentNotFound`] if `id` has no record.
    pub fn get(&self, id: EntityId) -> RegistryResult<T> {
        self.find(id).ok_or(RegistryError::ComponentNotFound)
    }

    /// Runs `f` on the record of `id` under the read lock.
    pub fn with<R>(&self, id: EntityId, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.read().find(id).map(f)
    }

    /// Runs `f` on the record of `id` under the write lock.
    pub fn with_mut<R>(&self, id: EntityId, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.write().find_mut(id).map(f)
    }

    /// Returns the number of records.
    #[must_use]
    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// Copies the record of `from` onto `to`, if `from` has one.
    ///
    /// Returns `true` if a record was copied.
    ///
    /// # Errors
    ///
    /// Same as [`ComponentStorage::assign`].
    pub fn clone_component(&self, from: EntityId, to: EntityId) -> RegistryResult<bool> {
        let mut records = self.write();
        let Some(value) = records.find(from).cloned() else {
            return Ok(false);
        };
        records.assign(to, value)?;
        Ok(true)
    }

    /// Visits every `(entity, record)` pair in dense order.
    ///
    /// The callback must not mutate this storage.
    pub fn for_each(&self, f: impl FnMut(EntityId, &T)) {
        self.read().for_each(f);
    }

    /// Visits every `(entity, record)` pair in dense order, mutably.
    ///
    /// The callback must not touch this storage through any other path.
    pub fn for_each_mut(&self, f: impl FnMut(EntityId, &mut T)) {
        self.write().for_each_mut(f);
    }

    /// Returns the bytes held by this storage's arrays.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.read().memory_usage()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Records<T>> {
        self.records.read_recursive()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Records<T>> {
        self.records.write()
    }

    pub(crate) fn try_write(&self) -> Option<RwLockWriteGuard<'_, Records<T>>> {
        self.records.try_write()
    }
}

/// Type-erased view of a [`ComponentStorage`].
///
/// This is the contract the registry needs for operations spanning every
/// component type: entity destruction, duplication, counting and memory
/// reporting.
pub trait AnyStorage: Send + Sync {
    /// Returns the family id of the stored type.
    fn family(&self) -> FamilyId;

    /// Returns the stored type's name.
    fn type_name(&self) -> &'static str;

    /// Removes the record of `id`. Returns whether one existed.
    fn erase(&self, id: EntityId) -> bool;

    /// Checks whether `id` has a record.
    fn contains(&self, id: EntityId) -> bool;

    /// Copies the record of `from` onto `to`, if any.
    ///
    /// # Errors
    ///
    /// Propagates storage growth failures.
    fn clone_entity(&self, from: EntityId, to: EntityId) -> RegistryResult<bool>;

    /// Returns the number of records.
    fn len(&self) -> usize;

    /// Returns `true` if there are no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every record. Returns how many there were.
    fn clear(&self) -> usize;

    /// Returns the bytes held by this storage.
    fn bytes_used(&self) -> usize;

    /// Converts the handle for downcasting to the concrete storage.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Component> AnyStorage for ComponentStorage<T> {
    fn family(&self) -> FamilyId {
        self.family
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn erase(&self, id: EntityId) -> bool {
        self.remove(id)
    }

    fn contains(&self, id: EntityId) -> bool {
        self.exists(id)
    }

    fn clone_entity(&self, from: EntityId, to: EntityId) -> RegistryResult<bool> {
        self.clone_component(from, to)
    }

    fn len(&self) -> usize {
        self.count()
    }

    fn clear(&self) -> usize {
        self.remove_all()
    }

    fn bytes_used(&self) -> usize {
        self.memory_usage()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
