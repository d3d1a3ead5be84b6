//! # Registry
//!
//! The central container: issues entity identifiers and routes every
//! component operation to the storage of its type, creating storages lazily
//! on first use.
//!
//! ## Locking
//!
//! Every lock is taken in one global order:
//!
//! ```text
//! entity lock  ->  storage map lock  ->  component storage locks
//! ```
//!
//! Creating and destroying entities take the entity lock exclusively; every
//! other operation takes it shared first. Operations spanning several
//! component types lock one storage at a time (joins aside), so a concurrent
//! reader may observe an entity halfway through destruction.
//!
//! Shared locks are taken recursively, which lets iteration callbacks and
//! filters read the registry. Callbacks that run under a storage lock
//! (iteration, filters, `with_component`, `with_component_mut` and the
//! `make` of `ensure_component`) must not write to the registry: no entity
//! creation or destruction, no component assignment or removal. A write
//! from such a callback panics. Collect the ids and apply the writes once
//! the callback returns.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, trace, warn};

use super::component::Component;
use super::entity::{EntityAllocator, EntityId};
use super::family::{FamilyId, TypeRegistry};
use super::filter::EntityFilter;
use super::query::ComponentSet;
use super::storage::{AnyStorage, ComponentStorage};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::memory::MemoryUsage;
use crate::sparse::SparseMap;
use crate::sync::{in_callback, CallbackScope};

/// Type-erased storages keyed by family id.
type StorageMap = SparseMap<FamilyId, Arc<dyn AnyStorage>>;

/// Panics if the current thread is inside a locked callback.
fn assert_writable(operation: &str) {
    assert!(
        !in_callback(),
        "Registry::{operation} called from a callback running under registry locks"
    );
}

/// Entity and component store.
///
/// All operations take `&self`; the registry is meant to be shared between
/// threads (for example behind an `Arc`).
///
/// # Example
///
/// ```rust,ignore
/// let registry = Registry::new();
///
/// let e = registry.create_entity()?;
/// registry.assign_component(e, Position { x: 1, y: 2 })?;
/// registry.assign_component(e, Velocity { x: 3, y: 4 })?;
///
/// registry.for_joined_components_mut::<(Position, Velocity)>(
///     |_, (p, v)| {
///         p.x += v.x;
///         p.y += v.y;
///     },
///     (),
/// );
/// ```
pub struct Registry {
    /// Sizing used for the allocator and for every new storage.
    config: RegistryConfig,
    /// Family ids of the component types seen so far.
    types: TypeRegistry,
    /// Live identifiers and the free list.
    entities: RwLock<EntityAllocator>,
    /// One storage per component type.
    storages: RwLock<StorageMap>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("entities", &self.entity_count())
            .field("storages", &self.storages.read_recursive().len())
            .finish()
    }
}

impl Registry {
    /// Creates a registry with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(RegistryConfig::default())
    }

    /// Creates a registry sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] if `config` does not validate.
    pub fn with_config(config: RegistryConfig) -> RegistryResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: RegistryConfig) -> Self {
        debug!(
            entity_capacity = config.entity_capacity,
            storage_capacity = config.storage_capacity,
            "Registry created"
        );
        Self {
            types: TypeRegistry::new(),
            entities: RwLock::new(EntityAllocator::with_capacity(config.entity_capacity)),
            storages: RwLock::new(StorageMap::new()),
            config,
        }
    }

    /// Returns the configuration this registry was built with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Returns the family id of `T`, registering the type on first use.
    #[must_use]
    pub fn family_of<T: Component>(&self) -> FamilyId {
        self.types.family_of::<T>()
    }

    /// Returns the type registry of this registry.
    #[inline]
    #[must_use]
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Creates an entity with no components.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::IndexSpaceExhausted`] when every index is in
    /// use.
    ///
    /// # Panics
    ///
    /// Panics if called from a callback running under registry locks.
    pub fn create_entity(&self) -> RegistryResult<EntityId> {
        assert_writable("create_entity");
        let created = self.entities.write().create();
        match created {
            Ok(id) => {
                trace!(entity = %id, "Entity created");
                Ok(id)
            }
            Err(err) => {
                warn!(error = %err, "Entity creation failed");
                Err(err)
            }
        }
    }

    /// Creates an entity and runs `build` to populate it.
    ///
    /// If `build` fails or panics, the entity is destroyed before the error
    /// (or panic) propagates, so no half-built entity is ever left behind.
    ///
    /// # Errors
    ///
    /// Returns whatever `build` returns, or the error of
    /// [`Registry::create_entity`] converted into `E`.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let player = registry.create_entity_with(|registry, id| {
    ///     registry.assign_component(id, Position { x: 0, y: 0 })?;
    ///     registry.assign_component(id, Health(100))?;
    ///     Ok::<_, RegistryError>(())
    /// })?;
    /// ```
    pub fn create_entity_with<E, F>(&self, build: F) -> Result<EntityId, E>
    where
        E: From<RegistryError>,
        F: FnOnce(&Self, EntityId) -> Result<(), E>,
    {
        let id = self.create_entity()?;
        let mut pending = PendingEntity {
            registry: self,
            id,
            committed: false,
        };
        build(self, id)?;
        pending.committed = true;
        Ok(id)
    }

    /// Creates an entity carrying a copy of every component of `source`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DeadEntity`] if `source` is not alive, or the
    /// error of [`Registry::create_entity`].
    pub fn create_entity_from(&self, source: EntityId) -> RegistryResult<EntityId> {
        if !self.valid_entity(source) {
            return Err(RegistryError::DeadEntity(source));
        }
        let id = self.create_entity_with(|registry, id| {
            let entities = registry.entities();
            // Destroyed between the check above and now.
            if !entities.is_alive(source) {
                return Err(RegistryError::DeadEntity(source));
            }
            let storages = registry.storage_map();
            for storage in storages.values() {
                storage.clone_entity(source, id)?;
            }
            Ok(())
        })?;
        trace!(source = %source, entity = %id, "Entity cloned");
        Ok(id)
    }

    /// Destroys `id` along with all its components.
    ///
    /// Returns `false` (and does nothing) if `id` is not alive.
    ///
    /// # Panics
    ///
    /// Panics if called from a callback running under registry locks.
    pub fn destroy_entity(&self, id: EntityId) -> bool {
        assert_writable("destroy_entity");
        let mut entities = self.entities.write();
        if !entities.is_alive(id) {
            return false;
        }
        let removed = self.erase_components(id);
        entities.destroy(id);
        trace!(entity = %id, components = removed, "Entity destroyed");
        true
    }

    /// Checks whether `id` is alive in this registry.
    #[must_use]
    pub fn valid_entity(&self, id: EntityId) -> bool {
        self.entities().is_alive(id)
    }

    /// Returns the number of alive entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities().len()
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// Attaches `value` to `id`, replacing the existing `T` if there is one.
    ///
    /// Returns `true` if `id` did not have a `T` before.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DeadEntity`] if `id` is not alive.
    ///
    /// # Panics
    ///
    /// Panics if called from a callback running under registry locks.
    pub fn assign_component<T: Component>(&self, id: EntityId, value: T) -> RegistryResult<bool> {
        assert_writable("assign_component");
        let entities = self.entities();
        if !entities.is_alive(id) {
            return Err(RegistryError::DeadEntity(id));
        }
        self.storage_or_create::<T>()?.assign(id, value)
    }

    /// Attaches `make()` to `id` unless it already has a `T`, and returns a
    /// copy of the `T` it has afterwards.
    ///
    /// `make` is only called when a new record is created, under the
    /// storage's write lock.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DeadEntity`] if `id` is not alive.
    ///
    /// # Panics
    ///
    /// Panics if called from a callback running under registry locks.
    pub fn ensure_component<T: Component>(
        &self,
        id: EntityId,
        make: impl FnOnce() -> T,
    ) -> RegistryResult<T> {
        assert_writable("ensure_component");
        let entities = self.entities();
        if !entities.is_alive(id) {
            return Err(RegistryError::DeadEntity(id));
        }
        let storage = self.storage_or_create::<T>()?;
        let _scope = CallbackScope::enter();
        storage.ensure(id, make)
    }

    /// Detaches `T` from `id`. Returns whether there was one.
    ///
    /// # Panics
    ///
    /// Panics if called from a callback running under registry locks.
    pub fn remove_component<T: Component>(&self, id: EntityId) -> bool {
        assert_writable("remove_component");
        let entities = self.entities();
        entities.is_alive(id) && self.find_storage::<T>().is_some_and(|s| s.remove(id))
    }

    /// Checks whether `id` is alive and has a `T`.
    #[must_use]
    pub fn exists_component<T: Component>(&self, id: EntityId) -> bool {
        let entities = self.entities();
        entities.is_alive(id) && self.find_storage::<T>().is_some_and(|s| s.exists(id))
    }

    /// Returns a copy of the `T` of `id`, if any.
    #[must_use]
    pub fn find_component<T: Component>(&self, id: EntityId) -> Option<T> {
        let entities = self.entities();
        if !entities.is_alive(id) {
            return None;
        }
        self.find_storage::<T>()?.find(id)
    }

    /// Returns a copy of the `T` of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DeadEntity`] if `id` is not alive, or
    /// [`RegistryError::ComponentNotFound`] if it has no `T`.
    pub fn get_component<T: Component>(&self, id: EntityId) -> RegistryResult<T> {
        let entities = self.entities();
        if !entities.is_alive(id) {
            return Err(RegistryError::DeadEntity(id));
        }
        self.find_storage::<T>()
            .ok_or(RegistryError::ComponentNotFound)?
            .get(id)
    }

    /// Runs `f` on the `T` of `id` without copying it.
    ///
    /// `f` runs under the storage's read lock. It may read the registry but
    /// must not write to it.
    pub fn with_component<T: Component, R>(
        &self,
        id: EntityId,
        f: impl FnOnce(&T) -> R,
    ) -> Option<R> {
        let entities = self.entities();
        if !entities.is_alive(id) {
            return None;
        }
        let storage = self.find_storage::<T>()?;
        let _scope = CallbackScope::enter();
        storage.with(id, f)
    }

    /// Runs `f` on the `T` of `id` in place.
    ///
    /// `f` runs under the storage's write lock. It must not access `T`
    /// through the registry, and must not write to the registry at all.
    ///
    /// # Panics
    ///
    /// Panics if called from a callback running under registry locks, or if
    /// `f` writes to the registry.
    pub fn with_component_mut<T: Component, R>(
        &self,
        id: EntityId,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        assert_writable("with_component_mut");
        let entities = self.entities();
        if !entities.is_alive(id) {
            return None;
        }
        let storage = self.find_storage::<T>()?;
        let _scope = CallbackScope::enter();
        storage.with_mut(id, f)
    }

    /// Returns a copy of every component of `S` that `id` has.
    ///
    /// ```rust,ignore
    /// let (pos, vel) = registry.find_components::<(Position, Velocity)>(id);
    /// ```
    #[must_use]
    pub fn find_components<S: ComponentSet>(&self, id: EntityId) -> S::Found {
        S::find(self, id)
    }

    /// Returns a copy of every component of `S`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DeadEntity`] if `id` is not alive, or
    /// [`RegistryError::ComponentNotFound`] if any component is missing.
    pub fn get_components<S: ComponentSet>(&self, id: EntityId) -> RegistryResult<S::Owned> {
        let entities = self.entities();
        if !entities.is_alive(id) {
            return Err(RegistryError::DeadEntity(id));
        }
        S::get(self, id)
    }

    /// Detaches every component from `id`. Returns how many were removed.
    ///
    /// # Panics
    ///
    /// Panics if called from a callback running under registry locks.
    pub fn remove_all_components(&self, id: EntityId) -> usize {
        assert_writable("remove_all_components");
        let entities = self.entities();
        if !entities.is_alive(id) {
            return 0;
        }
        self.erase_components(id)
    }

    /// Detaches `T` from every entity. Returns how many were removed.
    ///
    /// # Panics
    ///
    /// Panics if called from a callback running under registry locks.
    pub fn clear_components<T: Component>(&self) -> usize {
        assert_writable("clear_components");
        let _entities = self.entities();
        let removed = self.find_storage::<T>().map_or(0, |s| s.remove_all());
        debug!(component = type_name::<T>(), removed, "Component storage cleared");
        removed
    }

    /// Returns the number of entities with a `T`.
    #[must_use]
    pub fn component_count<T: Component>(&self) -> usize {
        let _entities = self.entities();
        self.find_storage::<T>().map_or(0, |s| s.count())
    }

    /// Returns the number of components attached to `id`.
    #[must_use]
    pub fn entity_component_count(&self, id: EntityId) -> usize {
        let entities = self.entities();
        if !entities.is_alive(id) {
            return 0;
        }
        self.storage_map()
            .values()
            .iter()
            .filter(|storage| storage.contains(id))
            .count()
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Visits every alive entity passing `filter`.
    ///
    /// Order is unspecified and changes as entities are destroyed.
    pub fn for_each_entity(&self, mut f: impl FnMut(EntityId), filter: impl EntityFilter) {
        self.for_joined_components::<()>(|id, ()| f(id), filter);
    }

    /// Visits every `(entity, T)` pair passing `filter`, in storage order.
    pub fn for_each_component<T: Component>(
        &self,
        mut f: impl FnMut(EntityId, &T),
        filter: impl EntityFilter,
    ) {
        self.for_joined_components::<(T,)>(|id, (value,)| f(id, value), filter);
    }

    /// Visits every `(entity, T)` pair passing `filter`, mutably.
    ///
    /// `filter` is evaluated for every entity before the storage is
    /// write-locked. `f` runs under that write lock: it may read other
    /// component types but must not write to the registry.
    ///
    /// # Panics
    ///
    /// Panics if `f` writes to the registry.
    pub fn for_each_component_mut<T: Component>(
        &self,
        mut f: impl FnMut(EntityId, &mut T),
        filter: impl EntityFilter,
    ) {
        self.for_joined_components_mut::<(T,)>(|id, (value,)| f(id, value), filter);
    }

    /// Visits every entity that has all of `S` and passes `filter`.
    ///
    /// The first type of `S` drives the iteration; list the rarest first.
    /// With `S = ()` this visits every alive entity.
    ///
    /// Every storage of `S` stays read-locked until the join returns, so
    /// writers to any of those types wait for it. `f` must not write to the
    /// registry; such a write panics.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// registry.for_joined_components::<(Position, Velocity)>(
    ///     |id, (pos, vel)| println!("{id}: {pos:?} {vel:?}"),
    ///     !exists::<Frozen>(),
    /// );
    /// ```
    pub fn for_joined_components<S: ComponentSet>(
        &self,
        f: impl FnMut(EntityId, S::Refs<'_>),
        filter: impl EntityFilter,
    ) {
        let _entities = self.entities();
        S::join(self, &filter, f);
    }

    /// Like [`Registry::for_joined_components`], with exclusive access.
    ///
    /// Every storage of `S` is write-locked for the whole iteration. `f` may
    /// read component types outside `S` but must not write to the registry.
    /// To change other types, collect the ids and apply the writes after the
    /// join returns.
    ///
    /// # Panics
    ///
    /// Panics if `S` names the same type twice, or if `f` writes to the
    /// registry.
    pub fn for_joined_components_mut<S: ComponentSet>(
        &self,
        f: impl FnMut(EntityId, S::Muts<'_>),
        filter: impl EntityFilter,
    ) {
        let _entities = self.entities();
        S::join_mut(self, &filter, f);
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Returns the bytes held by identifiers and by all component storages.
    #[must_use]
    pub fn memory_usage(&self) -> MemoryUsage {
        let entities = self.entities();
        MemoryUsage {
            entities: entities.memory_usage(),
            components: self
                .storage_map()
                .values()
                .iter()
                .map(|storage| storage.bytes_used())
                .sum(),
        }
    }

    /// Returns the bytes held by the storage of `T`.
    #[must_use]
    pub fn component_memory_usage<T: Component>(&self) -> usize {
        let _entities = self.entities();
        self.find_storage::<T>().map_or(0, |s| s.memory_usage())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Takes the entity lock shared.
    pub(crate) fn entities(&self) -> RwLockReadGuard<'_, EntityAllocator> {
        self.entities.read_recursive()
    }

    /// Returns the storage of `T` if one has been created.
    pub(crate) fn find_storage<T: Component>(&self) -> Option<Arc<ComponentStorage<T>>> {
        let family = self.types.find::<T>()?;
        let handle = Arc::clone(self.storages.read_recursive().find(&family)?);
        handle.into_any().downcast::<ComponentStorage<T>>().ok()
    }

    /// Returns the storage of `T`, creating it on first use.
    fn storage_or_create<T: Component>(&self) -> RegistryResult<Arc<ComponentStorage<T>>> {
        if let Some(storage) = self.find_storage::<T>() {
            return Ok(storage);
        }

        let family = self.types.family_of::<T>();
        let mut storages = self.storages.write();
        // Lost the race to another creator.
        if let Some(handle) = storages.find(&family) {
            if let Ok(storage) = Arc::clone(handle).into_any().downcast::<ComponentStorage<T>>() {
                return Ok(storage);
            }
        }

        let storage = Arc::new(ComponentStorage::<T>::new(family, self.config.storage_capacity));
        storages.insert_or_assign(family, Arc::clone(&storage) as Arc<dyn AnyStorage>)?;
        debug!(
            family,
            component = type_name::<T>(),
            capacity = self.config.storage_capacity,
            "Component storage created"
        );
        Ok(storage)
    }

    /// Takes the storage map lock shared.
    ///
    /// Storage locks may be taken while the guard is held, as they come after
    /// the map in the lock order.
    fn storage_map(&self) -> RwLockReadGuard<'_, StorageMap> {
        self.storages.read_recursive()
    }

    /// Removes `id` from every storage. Returns how many held it.
    fn erase_components(&self, id: EntityId) -> usize {
        self.storage_map()
            .values()
            .iter()
            .filter(|storage| storage.erase(id))
            .count()
    }
}

/// Destroys a freshly created entity unless construction completes.
struct PendingEntity<'a> {
    registry: &'a Registry,
    id: EntityId,
    committed: bool,
}

impl Drop for PendingEntity<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.registry.destroy_entity(self.id);
            debug!(entity = %self.id, "Entity construction rolled back");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::filter::exists;

    #[derive(Clone, Debug, PartialEq)]
    struct Position {
        x: i32,
        y: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Velocity {
        x: i32,
        y: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Health(u32);

    #[derive(Clone, Debug, PartialEq)]
    struct Frozen;

    #[test]
    fn test_component_crud() {
        let registry = Registry::new();
        let e = registry.create_entity().unwrap();

        assert_eq!(registry.assign_component(e, Position { x: 1, y: 2 }), Ok(true));
        assert_eq!(registry.find_component::<Position>(e), Some(Position { x: 1, y: 2 }));
        assert_eq!(registry.get_component::<Position>(e), Ok(Position { x: 1, y: 2 }));

        assert_eq!(registry.assign_component(e, Position { x: 3, y: 4 }), Ok(false));
        assert_eq!(registry.component_count::<Position>(), 1);

        assert!(registry.remove_component::<Position>(e));
        assert!(!registry.remove_component::<Position>(e));
        assert_eq!(registry.find_component::<Position>(e), None);
        assert_eq!(
            registry.get_component::<Position>(e),
            Err(RegistryError::ComponentNotFound)
        );
    }

    #[test]
    fn test_unknown_type_is_absent() {
        let registry = Registry::new();
        let e = registry.create_entity().unwrap();
        assert!(!registry.exists_component::<Health>(e));
        assert_eq!(registry.component_count::<Health>(), 0);
        assert_eq!(registry.get_component::<Health>(e), Err(RegistryError::ComponentNotFound));
        assert!(registry.types().is_empty());
    }

    #[test]
    fn test_dead_entity_is_rejected() {
        let registry = Registry::new();
        let e = registry.create_entity().unwrap();
        assert!(registry.destroy_entity(e));

        assert_eq!(
            registry.assign_component(e, Health(1)),
            Err(RegistryError::DeadEntity(e))
        );
        assert_eq!(registry.get_component::<Health>(e), Err(RegistryError::DeadEntity(e)));
        assert_eq!(registry.find_component::<Health>(e), None);
        assert!(!registry.destroy_entity(e));
        assert!(!registry.valid_entity(e));
        assert!(!registry.valid_entity(EntityId::NULL));
    }

    #[test]
    fn test_ensure_component() {
        let registry = Registry::new();
        let e = registry.create_entity().unwrap();

        assert_eq!(registry.ensure_component(e, || Health(10)), Ok(Health(10)));
        assert_eq!(registry.ensure_component(e, || Health(99)), Ok(Health(10)));
        assert_eq!(registry.get_component::<Health>(e), Ok(Health(10)));
    }

    #[test]
    fn test_destroy_removes_components() {
        let registry = Registry::new();
        let e = registry.create_entity().unwrap();
        registry.assign_component(e, Position { x: 0, y: 0 }).unwrap();
        registry.assign_component(e, Health(5)).unwrap();
        registry.assign_component(e, Frozen).unwrap();
        assert_eq!(registry.entity_component_count(e), 3);

        assert!(registry.destroy_entity(e));
        assert_eq!(registry.component_count::<Position>(), 0);
        assert_eq!(registry.component_count::<Health>(), 0);
        assert_eq!(registry.component_count::<Frozen>(), 0);

        let reused = registry.create_entity().unwrap();
        assert_eq!(reused.index(), e.index());
        assert_eq!(registry.entity_component_count(reused), 0);
    }

    #[test]
    fn test_remove_all_and_clear() {
        let registry = Registry::new();
        let a = registry.create_entity().unwrap();
        let b = registry.create_entity().unwrap();
        for &e in &[a, b] {
            registry.assign_component(e, Health(1)).unwrap();
            registry.assign_component(e, Position { x: 0, y: 0 }).unwrap();
        }

        assert_eq!(registry.remove_all_components(a), 2);
        assert_eq!(registry.remove_all_components(a), 0);
        assert!(registry.valid_entity(a));

        assert_eq!(registry.clear_components::<Health>(), 1);
        assert_eq!(registry.clear_components::<Health>(), 0);
        assert!(registry.exists_component::<Position>(b));
    }

    #[test]
    fn test_create_entity_from_copies_components() {
        let registry = Registry::new();
        let source = registry.create_entity().unwrap();
        registry.assign_component(source, Position { x: 7, y: 8 }).unwrap();
        registry.assign_component(source, Frozen).unwrap();

        let copy = registry.create_entity_from(source).unwrap();
        assert_ne!(copy, source);
        assert_eq!(
            registry.get_components::<(Position, Frozen)>(copy),
            Ok((Position { x: 7, y: 8 }, Frozen))
        );
        assert!(!registry.exists_component::<Health>(copy));

        registry.destroy_entity(source);
        assert_eq!(
            registry.create_entity_from(source),
            Err(RegistryError::DeadEntity(source))
        );
    }

    #[test]
    fn test_create_entity_with_rolls_back_on_error() {
        let registry = Registry::new();

        let result: RegistryResult<EntityId> = registry.create_entity_with(|registry, id| {
            registry.assign_component(id, Health(1))?;
            registry.get_component::<Position>(id)?;
            Ok(())
        });

        assert_eq!(result, Err(RegistryError::ComponentNotFound));
        assert_eq!(registry.entity_count(), 0);
        assert_eq!(registry.component_count::<Health>(), 0);
    }

    #[test]
    fn test_create_entity_with_rolls_back_on_panic() {
        let registry = Registry::new();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registry.create_entity_with(|registry, id| -> RegistryResult<()> {
                registry.assign_component(id, Health(1))?;
                panic!("builder failed");
            })
        }));

        assert!(outcome.is_err());
        assert_eq!(registry.entity_count(), 0);
        assert_eq!(registry.component_count::<Health>(), 0);
    }

    #[test]
    fn test_create_entity_with_commits() {
        let registry = Registry::new();
        let id = registry
            .create_entity_with(|registry, id| {
                registry.assign_component(id, Health(3))?;
                Ok::<_, RegistryError>(())
            })
            .unwrap();
        assert!(registry.valid_entity(id));
        assert_eq!(registry.get_component::<Health>(id), Ok(Health(3)));
    }

    #[test]
    fn test_with_component_mut() {
        let registry = Registry::new();
        let e = registry.create_entity().unwrap();
        registry.assign_component(e, Health(10)).unwrap();

        let after = registry.with_component_mut::<Health, _>(e, |h| {
            h.0 -= 3;
            h.0
        });
        assert_eq!(after, Some(7));
        assert_eq!(registry.with_component::<Health, _>(e, |h| h.0), Some(7));
        assert_eq!(registry.with_component::<Position, _>(e, |p| p.x), None);
    }

    #[test]
    fn test_find_components() {
        let registry = Registry::new();
        let e = registry.create_entity().unwrap();
        registry.assign_component(e, Health(2)).unwrap();

        assert_eq!(
            registry.find_components::<(Health, Position)>(e),
            (Some(Health(2)), None)
        );
        assert_eq!(
            registry.get_components::<(Health, Position)>(e),
            Err(RegistryError::ComponentNotFound)
        );
    }

    #[test]
    fn test_movement_join() {
        let registry = Registry::new();
        let e1 = registry.create_entity().unwrap();
        registry.assign_component(e1, Position { x: 1, y: 2 }).unwrap();
        registry.assign_component(e1, Velocity { x: 3, y: 4 }).unwrap();
        let e2 = registry.create_entity().unwrap();
        registry.assign_component(e2, Position { x: 5, y: 6 }).unwrap();
        registry.assign_component(e2, Velocity { x: 7, y: 8 }).unwrap();

        registry.for_joined_components_mut::<(Position, Velocity)>(
            |_, (p, v)| {
                p.x += v.x;
                p.y += v.y;
            },
            (),
        );

        assert_eq!(registry.get_component::<Position>(e1), Ok(Position { x: 4, y: 6 }));
        assert_eq!(registry.get_component::<Position>(e2), Ok(Position { x: 12, y: 14 }));
    }

    #[test]
    fn test_filtered_iteration() {
        let registry = Registry::new();
        let mut ids = Vec::new();
        for i in 0..6 {
            let e = registry.create_entity().unwrap();
            registry.assign_component(e, Health(i)).unwrap();
            if i % 2 == 0 {
                registry.assign_component(e, Frozen).unwrap();
            }
            ids.push(e);
        }

        let mut thawed = Vec::new();
        registry.for_each_component::<Health>(|_, h| thawed.push(h.0), !exists::<Frozen>());
        thawed.sort_unstable();
        assert_eq!(thawed, vec![1, 3, 5]);

        registry.for_each_component_mut::<Health>(|_, h| h.0 += 100, exists::<Frozen>());
        assert_eq!(registry.get_component::<Health>(ids[0]), Ok(Health(100)));
        assert_eq!(registry.get_component::<Health>(ids[1]), Ok(Health(1)));

        let mut frozen = 0;
        registry.for_each_entity(|_| frozen += 1, exists::<Frozen>());
        assert_eq!(frozen, 3);
    }

    #[test]
    fn test_callbacks_may_read_registry() {
        let registry = Registry::new();
        let e = registry.create_entity().unwrap();
        registry.assign_component(e, Position { x: 1, y: 1 }).unwrap();
        registry.assign_component(e, Health(4)).unwrap();

        let mut seen = Vec::new();
        registry.for_each_component::<Position>(
            |id, _| seen.push(registry.find_component::<Health>(id)),
            (),
        );
        assert_eq!(seen, vec![Some(Health(4))]);
    }

    #[test]
    fn test_mutable_join_callback_may_read_other_types() {
        let registry = Registry::new();
        let e = registry.create_entity().unwrap();
        registry.assign_component(e, Position { x: 1, y: 1 }).unwrap();
        registry.assign_component(e, Health(4)).unwrap();

        registry.for_each_component_mut::<Position>(
            |id, p| {
                let health = registry.with_component::<Health, _>(id, |h| h.0).unwrap_or(0);
                p.x += i32::try_from(health).unwrap();
            },
            (),
        );
        assert_eq!(registry.get_component::<Position>(e), Ok(Position { x: 5, y: 1 }));
    }

    #[test]
    #[should_panic(expected = "assign_component called from a callback")]
    fn test_write_from_mutable_join_panics() {
        let registry = Registry::new();
        let e = registry.create_entity().unwrap();
        registry.assign_component(e, Position { x: 0, y: 0 }).unwrap();

        registry.for_each_component_mut::<Position>(
            |id, _| {
                let _ = registry.assign_component(id, Health(1));
            },
            (),
        );
    }

    #[test]
    fn test_registry_usable_after_rejected_write() {
        let registry = Registry::new();
        let e = registry.create_entity().unwrap();
        registry.assign_component(e, Position { x: 0, y: 0 }).unwrap();
        registry.assign_component(e, Health(1)).unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registry.for_joined_components::<(Position, Health)>(
                |id, _| {
                    registry.remove_component::<Health>(id);
                },
                (),
            );
        }));
        assert!(outcome.is_err());

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registry.with_component::<Health, _>(e, |_| registry.destroy_entity(e))
        }));
        assert!(outcome.is_err());

        assert!(registry.remove_component::<Health>(e));
        registry.with_component_mut::<Position, _>(e, |p| p.x = 9);
        assert_eq!(registry.get_component::<Position>(e), Ok(Position { x: 9, y: 0 }));
        assert!(registry.destroy_entity(e));
    }

    #[test]
    fn test_ensure_make_cannot_write() {
        let registry = Registry::new();
        let e = registry.create_entity().unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registry.ensure_component(e, || {
                registry.create_entity().unwrap();
                Health(1)
            })
        }));
        assert!(outcome.is_err());
        assert_eq!(registry.entity_count(), 1);
        assert_eq!(registry.ensure_component(e, || Health(2)), Ok(Health(2)));
    }

    #[test]
    fn test_memory_usage() {
        let registry = Registry::new();
        let empty = registry.memory_usage();
        assert!(empty.entities > 0);
        assert_eq!(empty.components, 0);

        let e = registry.create_entity().unwrap();
        registry.assign_component(e, Position { x: 0, y: 0 }).unwrap();
        let usage = registry.memory_usage();
        assert_eq!(usage.components, registry.component_memory_usage::<Position>());
        assert!(usage.components > 0);
        assert_eq!(registry.component_memory_usage::<Health>(), 0);
    }

    #[test]
    fn test_with_config() {
        let registry = Registry::with_config(RegistryConfig {
            entity_capacity: 4,
            storage_capacity: 2,
        })
        .unwrap();
        assert_eq!(registry.config().storage_capacity, 2);

        let oversized = RegistryConfig {
            entity_capacity: usize::MAX,
            ..RegistryConfig::default()
        };
        assert!(matches!(
            Registry::with_config(oversized),
            Err(RegistryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_family_ids_follow_first_use() {
        let registry = Registry::new();
        let e = registry.create_entity().unwrap();
        registry.assign_component(e, Health(1)).unwrap();
        assert_eq!(registry.family_of::<Health>(), 1);
        assert_eq!(registry.family_of::<Position>(), 2);
    }
}
