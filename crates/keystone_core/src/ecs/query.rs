//! # Component Sets and Joins
//!
//! A [`ComponentSet`] is a tuple of component types, `()` through eight
//! elements. It drives the multi-type operations of the registry:
//! presence checks, bulk lookup and the joins.
//!
//! ## Join
//!
//! The first type is the driver. Its storage is walked in dense order and
//! every other type is probed per entity:
//!
//! ```text
//! driver  Position: [e3, e1, e7]
//! probe   Velocity: {e1, e7}
//!                          -> visits e1, e7 (in driver order)
//! ```
//!
//! Put the rarest type first; the cost is proportional to the driver's size.
//!
//! ## Locking
//!
//! A read join read-locks the driver and every probe storage up front and
//! holds them until it returns. That is stronger than locking each probe per
//! lookup: a writer to any listed type waits for the whole join, not for one
//! probe. Readers are not affected.
//!
//! A mutable join takes all write locks at once through
//! [`crate::sync::acquire_all`], and evaluates its filter before it does.
//!
//! Callbacks and filters run inside a [`CallbackScope`], so any registry
//! write they attempt panics instead of deadlocking against another join.

use std::collections::HashSet;

use super::component::Component;
use super::entity::EntityId;
use super::family::FamilyId;
use super::filter::EntityFilter;
use super::registry::Registry;
use crate::error::RegistryResult;
use crate::sync::{acquire_all, CallbackScope};

/// A tuple of component types usable in joins and bulk lookups.
pub trait ComponentSet: 'static {
    /// Shared references to one entity's components.
    type Refs<'a>;
    /// Exclusive references to one entity's components.
    type Muts<'a>;
    /// One entity's components by value.
    type Owned;
    /// One entity's components by value, each possibly absent.
    type Found;

    /// Checks whether `id` has every component of the set.
    fn all_exist(registry: &Registry, id: EntityId) -> bool;

    /// Checks whether `id` has at least one component of the set.
    fn any_exist(registry: &Registry, id: EntityId) -> bool;

    /// Copies out every component of `id` that exists.
    fn find(registry: &Registry, id: EntityId) -> Self::Found;

    /// Copies out every component of `id`.
    ///
    /// # Errors
    ///
    /// Fails on the first component that cannot be read.
    fn get(registry: &Registry, id: EntityId) -> RegistryResult<Self::Owned>;

    /// Visits every entity that has the whole set and passes `filter`.
    fn join<F>(registry: &Registry, filter: &dyn EntityFilter, f: F)
    where
        F: FnMut(EntityId, Self::Refs<'_>);

    /// Like [`ComponentSet::join`], handing out exclusive references.
    ///
    /// # Panics
    ///
    /// Panics if the set names the same component type twice.
    fn join_mut<F>(registry: &Registry, filter: &dyn EntityFilter, f: F)
    where
        F: FnMut(EntityId, Self::Muts<'_>);
}

impl ComponentSet for () {
    type Refs<'a> = ();
    type Muts<'a> = ();
    type Owned = ();
    type Found = ();

    fn all_exist(_registry: &Registry, _id: EntityId) -> bool {
        true
    }

    fn any_exist(_registry: &Registry, _id: EntityId) -> bool {
        false
    }

    fn find(_registry: &Registry, _id: EntityId) -> Self::Found {}

    fn get(_registry: &Registry, _id: EntityId) -> RegistryResult<Self::Owned> {
        Ok(())
    }

    fn join<F>(registry: &Registry, filter: &dyn EntityFilter, mut f: F)
    where
        F: FnMut(EntityId, Self::Refs<'_>),
    {
        let entities = registry.entities();
        let _scope = CallbackScope::enter();
        for &id in entities.alive() {
            if filter.matches(registry, id) {
                f(id, ());
            }
        }
    }

    fn join_mut<F>(registry: &Registry, filter: &dyn EntityFilter, mut f: F)
    where
        F: FnMut(EntityId, Self::Muts<'_>),
    {
        Self::join(registry, filter, |id, ()| f(id, ()));
    }
}

/// Panics if any family appears twice.
fn assert_disjoint(families: &[FamilyId]) {
    for (i, family) in families.iter().enumerate() {
        assert!(
            !families[i + 1..].contains(family),
            "component type listed twice in a mutable join"
        );
    }
}

/// Evaluates `filter` over `ids` ahead of a mutable join.
///
/// Returns `None` when every entity passes.
fn prefilter(
    registry: &Registry,
    ids: &[EntityId],
    filter: &dyn EntityFilter,
) -> Option<HashSet<EntityId>> {
    if filter.is_trivial() {
        return None;
    }
    Some(
        ids.iter()
            .copied()
            .filter(|&id| filter.matches(registry, id))
            .collect(),
    )
}

macro_rules! impl_component_set {
    ($d:ident $dstore:ident $dguard:ident $dval:ident $(, $p:ident $pstore:ident $pguard:ident $pval:ident)*) => {
        impl<$d: Component $(, $p: Component)*> ComponentSet for ($d, $($p,)*) {
            type Refs<'a> = (&'a $d, $(&'a $p,)*);
            type Muts<'a> = (&'a mut $d, $(&'a mut $p,)*);
            type Owned = ($d, $($p,)*);
            type Found = (Option<$d>, $(Option<$p>,)*);

            fn all_exist(registry: &Registry, id: EntityId) -> bool {
                registry.exists_component::<$d>(id) $(&& registry.exists_component::<$p>(id))*
            }

            fn any_exist(registry: &Registry, id: EntityId) -> bool {
                registry.exists_component::<$d>(id) $(|| registry.exists_component::<$p>(id))*
            }

            fn find(registry: &Registry, id: EntityId) -> Self::Found {
                (registry.find_component::<$d>(id), $(registry.find_component::<$p>(id),)*)
            }

            fn get(registry: &Registry, id: EntityId) -> RegistryResult<Self::Owned> {
                Ok((registry.get_component::<$d>(id)?, $(registry.get_component::<$p>(id)?,)*))
            }

            fn join<F>(registry: &Registry, filter: &dyn EntityFilter, mut f: F)
            where
                F: FnMut(EntityId, Self::Refs<'_>),
            {
                // A type nobody has assigned yet means nothing can match.
                let Some($dstore) = registry.find_storage::<$d>() else { return };
                $(let Some($pstore) = registry.find_storage::<$p>() else { return };)*

                let $dguard = $dstore.read();
                $(let $pguard = $pstore.read();)*
                let _scope = CallbackScope::enter();

                $dguard.for_each(|id, $dval| {
                    if !filter.matches(registry, id) {
                        return;
                    }
                    $(let Some($pval) = $pguard.find(id) else { return };)*
                    f(id, ($dval, $($pval,)*));
                });
            }

            fn join_mut<F>(registry: &Registry, filter: &dyn EntityFilter, mut f: F)
            where
                F: FnMut(EntityId, Self::Muts<'_>),
            {
                let Some($dstore) = registry.find_storage::<$d>() else { return };
                $(let Some($pstore) = registry.find_storage::<$p>() else { return };)*
                assert_disjoint(&[$dstore.family(), $($pstore.family(),)*]);

                let _scope = CallbackScope::enter();
                let allowed = prefilter(registry, $dstore.read().ids(), filter);

                let (mut $dguard, $(mut $pguard,)*) = acquire_all(|| {
                    if let (Some($dguard), $(Some($pguard),)*) =
                        ($dstore.try_write(), $($pstore.try_write(),)*)
                    {
                        Some(($dguard, $($pguard,)*))
                    } else {
                        None
                    }
                });

                $dguard.for_each_mut(|id, $dval| {
                    if allowed.as_ref().is_some_and(|ids| !ids.contains(&id)) {
                        return;
                    }
                    $(let Some($pval) = $pguard.find_mut(id) else { return };)*
                    f(id, ($dval, $($pval,)*));
                });
            }
        }
    };
}

impl_component_set!(A a ga va);
impl_component_set!(A a ga va, B b gb vb);
impl_component_set!(A a ga va, B b gb vb, C c gc vc);
impl_component_set!(A a ga va, B b gb vb, C c gc vc, D d gd vd);
impl_component_set!(A a ga va, B b gb vb, C c gc vc, D d gd vd, E e ge ve);
impl_component_set!(A a ga va, B b gb vb, C c gc vc, D d gd vd, E e ge ve, F2 f2 gf vf);
impl_component_set!(A a ga va, B b gb vb, C c gc vc, D d gd vd, E e ge ve, F2 f2 gf vf, G g gg vg);
impl_component_set!(A a ga va, B b gb vb, C c gc vc, D d gd vd, E e ge ve, F2 f2 gf vf, G g gg vg, H h gh vh);

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Position(i32);

    #[derive(Clone, Debug, PartialEq)]
    struct Velocity(i32);

    #[derive(Clone, Debug, PartialEq)]
    struct Frozen;

    fn populated() -> (Registry, Vec<EntityId>) {
        let registry = Registry::new();
        let ids: Vec<_> = (0..4).map(|_| registry.create_entity().unwrap()).collect();
        for (i, &id) in ids.iter().enumerate() {
            registry.assign_component(id, Position(i as i32)).unwrap();
        }
        registry.assign_component(ids[1], Velocity(10)).unwrap();
        registry.assign_component(ids[3], Velocity(30)).unwrap();
        registry.assign_component(ids[3], Frozen).unwrap();
        (registry, ids)
    }

    #[test]
    fn test_presence_checks() {
        let (registry, ids) = populated();
        assert!(<(Position, Velocity)>::all_exist(&registry, ids[1]));
        assert!(!<(Position, Velocity)>::all_exist(&registry, ids[0]));
        assert!(<(Velocity, Frozen)>::any_exist(&registry, ids[1]));
        assert!(!<(Velocity, Frozen)>::any_exist(&registry, ids[2]));
        assert!(<()>::all_exist(&registry, ids[0]));
        assert!(!<()>::any_exist(&registry, ids[0]));
    }

    #[test]
    fn test_find_and_get() {
        let (registry, ids) = populated();
        assert_eq!(
            <(Position, Velocity)>::find(&registry, ids[0]),
            (Some(Position(0)), None)
        );
        assert_eq!(
            <(Position, Velocity)>::get(&registry, ids[3]),
            Ok((Position(3), Velocity(30)))
        );
        assert!(<(Position, Velocity)>::get(&registry, ids[2]).is_err());
    }

    #[test]
    fn test_join_visits_intersection() {
        let (registry, ids) = populated();
        let mut seen = Vec::new();
        <(Position, Velocity)>::join(&registry, &(), |id, (p, v)| seen.push((id, p.0 + v.0)));
        seen.sort();
        assert_eq!(seen, vec![(ids[1], 11), (ids[3], 33)]);
    }

    #[test]
    fn test_join_holds_read_locks_until_done() {
        let (registry, _) = populated();
        let velocity = registry.find_storage::<Velocity>().unwrap();

        let mut writable = Vec::new();
        <(Position, Velocity)>::join(&registry, &(), |_, _| {
            writable.push(velocity.try_write().is_some());
        });

        assert_eq!(writable, vec![false, false]);
        assert!(velocity.try_write().is_some());
    }

    #[test]
    fn test_join_with_unknown_type_visits_nothing() {
        #[allow(dead_code)]
        #[derive(Clone)]
        struct Unused;

        let (registry, _) = populated();
        let mut visits = 0;
        <(Position, Unused)>::join(&registry, &(), |_, _| visits += 1);
        assert_eq!(visits, 0);
    }

    #[test]
    fn test_join_mut_writes_through() {
        let (registry, ids) = populated();
        <(Position, Velocity)>::join_mut(&registry, &(), |_, (p, v)| {
            p.0 += v.0;
            v.0 = 0;
        });
        assert_eq!(registry.find_component::<Position>(ids[1]), Some(Position(11)));
        assert_eq!(registry.find_component::<Velocity>(ids[3]), Some(Velocity(0)));
        assert_eq!(registry.find_component::<Position>(ids[0]), Some(Position(0)));
    }

    #[test]
    #[should_panic(expected = "listed twice")]
    fn test_join_mut_rejects_aliasing() {
        let (registry, _) = populated();
        <(Position, Position)>::join_mut(&registry, &(), |_, _| {});
    }

    #[test]
    fn test_empty_set_joins_every_entity() {
        let (registry, ids) = populated();
        let mut seen = Vec::new();
        <()>::join(&registry, &(), |id, ()| seen.push(id));
        seen.sort();
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_assert_disjoint() {
        assert_disjoint(&[]);
        assert_disjoint(&[1, 2, 3]);
        assert!(std::panic::catch_unwind(|| assert_disjoint(&[1, 2, 1])).is_err());
    }
}
