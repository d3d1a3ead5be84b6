//! # Type Families
//!
//! Every component type gets a small integer ("family id") the first time a
//! registry sees it. The id is the type-erased key for that type's storage.
//!
//! Ids are owned by a [`TypeRegistry`] instance rather than a process-wide
//! static, so two registries number their types independently.

use std::any::{type_name, TypeId};
use std::collections::HashMap;

use parking_lot::RwLock;

/// Small integer identifying a component type within one registry.
///
/// Assigned from 1 upward in first-registration order. 0 is never issued.
pub type FamilyId = u16;

/// Assigns and remembers family ids.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    inner: RwLock<Families>,
}

#[derive(Debug, Default)]
struct Families {
    /// Type to family id.
    ids: HashMap<TypeId, FamilyId>,
    /// Type names, indexed by `family - 1`.
    names: Vec<&'static str>,
}

impl TypeRegistry {
    /// Creates an empty type registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the family id of `T`, registering it on first use.
    ///
    /// # Panics
    ///
    /// Panics if more than `u16::MAX` distinct types are registered.
    pub fn family_of<T: 'static>(&self) -> FamilyId {
        if let Some(family) = self.find::<T>() {
            return family;
        }
        let mut families = self.inner.write();
        // Another thread may have registered T between the two locks.
        if let Some(&family) = families.ids.get(&TypeId::of::<T>()) {
            return family;
        }
        let family = FamilyId::try_from(families.names.len() + 1).unwrap_or_else(|_| {
            panic!("family id space exhausted registering {}", type_name::<T>())
        });
        families.ids.insert(TypeId::of::<T>(), family);
        families.names.push(type_name::<T>());
        family
    }

    /// Returns the family id of `T` if it has been registered.
    #[must_use]
    pub fn find<T: 'static>(&self) -> Option<FamilyId> {
        self.inner.read().ids.get(&TypeId::of::<T>()).copied()
    }

    /// Returns the type name registered under `family`.
    #[must_use]
    pub fn name_of(&self, family: FamilyId) -> Option<&'static str> {
        let index = usize::from(family).checked_sub(1)?;
        self.inner.read().names.get(index).copied()
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().names.len()
    }

    /// Returns `true` if no type has been registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
