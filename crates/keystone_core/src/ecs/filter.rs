//! # Entity Filters
//!
//! Predicates that narrow iteration. Filters are built from a few
//! primitives and combined with the usual operators:
//!
//! ```rust,ignore
//! // Entities with a Velocity, that are not Frozen.
//! let moving = exists::<Velocity>() & !exists::<Frozen>();
//! registry.for_each_entity(|id| println!("{id}"), moving);
//! ```
//!
//! `()` is the filter that accepts everything.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{self, BitAnd, BitOr};

use super::component::Component;
use super::entity::EntityId;
use super::query::ComponentSet;
use super::registry::Registry;

/// A predicate over entities.
///
/// Filters are evaluated while the iterating operation holds read locks, so
/// they may query the registry but must not mutate it.
pub trait EntityFilter {
    /// Checks whether `id` passes.
    fn matches(&self, registry: &Registry, id: EntityId) -> bool;

    /// Returns `true` if this filter accepts every entity, letting iteration
    /// skip evaluating it.
    fn is_trivial(&self) -> bool {
        false
    }
}

impl EntityFilter for () {
    #[inline]
    fn matches(&self, _registry: &Registry, _id: EntityId) -> bool {
        true
    }

    #[inline]
    fn is_trivial(&self) -> bool {
        true
    }
}

impl<F: EntityFilter + ?Sized> EntityFilter for &F {
    #[inline]
    fn matches(&self, registry: &Registry, id: EntityId) -> bool {
        (**self).matches(registry, id)
    }

    #[inline]
    fn is_trivial(&self) -> bool {
        (**self).is_trivial()
    }
}

/// Passes entities that have component `T`. See [`exists`].
pub struct Exists<T>(PhantomData<fn() -> T>);

/// Passes entities that have every component of `S`. See [`exists_all`].
pub struct ExistsAll<S>(PhantomData<fn() -> S>);

/// Passes entities that have any component of `S`. See [`exists_any`].
pub struct ExistsAny<S>(PhantomData<fn() -> S>);

/// Passes everything or nothing. See [`always`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Always(pub bool);

/// Negation of a filter.
#[derive(Clone, Copy, Debug)]
pub struct Not<F>(F);

/// Conjunction of two filters. The right side is skipped when the left fails.
#[derive(Clone, Copy, Debug)]
pub struct And<A, B>(A, B);

/// Disjunction of two filters. The right side is skipped when the left passes.
#[derive(Clone, Copy, Debug)]
pub struct Or<A, B>(A, B);

/// Filter passing entities that have component `T`.
#[inline]
#[must_use]
pub fn exists<T: Component>() -> Exists<T> {
    Exists(PhantomData)
}

/// Filter passing entities that have every component of `S`.
///
/// `exists_all::<()>()` passes everything.
#[inline]
#[must_use]
pub fn exists_all<S: ComponentSet>() -> ExistsAll<S> {
    ExistsAll(PhantomData)
}

/// Filter passing entities that have at least one component of `S`.
///
/// `exists_any::<()>()` passes nothing.
#[inline]
#[must_use]
pub fn exists_any<S: ComponentSet>() -> ExistsAny<S> {
    ExistsAny(PhantomData)
}

/// Constant filter.
#[inline]
#[must_use]
pub const fn always(pass: bool) -> Always {
    Always(pass)
}

impl<T: Component> EntityFilter for Exists<T> {
    #[inline]
    fn matches(&self, registry: &Registry, id: EntityId) -> bool {
        registry.exists_component::<T>(id)
    }
}

impl<S: ComponentSet> EntityFilter for ExistsAll<S> {
    #[inline]
    fn matches(&self, registry: &Registry, id: EntityId) -> bool {
        S::all_exist(registry, id)
    }
}

impl<S: ComponentSet> EntityFilter for ExistsAny<S> {
    #[inline]
    fn matches(&self, registry: &Registry, id: EntityId) -> bool {
        S::any_exist(registry, id)
    }
}

impl EntityFilter for Always {
    #[inline]
    fn matches(&self, _registry: &Registry, _id: EntityId) -> bool {
        self.0
    }

    #[inline]
    fn is_trivial(&self) -> bool {
        self.0
    }
}

impl<F: EntityFilter> EntityFilter for Not<F> {
    #[inline]
    fn matches(&self, registry: &Registry, id: EntityId) -> bool {
        !self.0.matches(registry, id)
    }
}

impl<A: EntityFilter, B: EntityFilter> EntityFilter for And<A, B> {
    #[inline]
    fn matches(&self, registry: &Registry, id: EntityId) -> bool {
        self.0.matches(registry, id) && self.1.matches(registry, id)
    }

    fn is_trivial(&self) -> bool {
        self.0.is_trivial() && self.1.is_trivial()
    }
}

impl<A: EntityFilter, B: EntityFilter> EntityFilter for Or<A, B> {
    #[inline]
    fn matches(&self, registry: &Registry, id: EntityId) -> bool {
        self.0.matches(registry, id) || self.1.matches(registry, id)
    }

    fn is_trivial(&self) -> bool {
        self.0.is_trivial() || self.1.is_trivial()
    }
}

// PhantomData filters are Copy whatever their type parameter is.
macro_rules! impl_marker_traits {
    ($($ty:ident),*) => {$(
        impl<T> Clone for $ty<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $ty<T> {}

        impl<T> fmt::Debug for $ty<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}<{}>", stringify!($ty), std::any::type_name::<T>())
            }
        }
    )*};
}

impl_marker_traits!(Exists, ExistsAll, ExistsAny);

macro_rules! impl_filter_ops {
    ($([$($gen:tt)*] $ty:ty),* $(,)?) => {$(
        impl<$($gen)* Rhs: EntityFilter> BitAnd<Rhs> for $ty {
            type Output = And<Self, Rhs>;

            fn bitand(self, rhs: Rhs) -> Self::Output {
                And(self, rhs)
            }
        }

        impl<$($gen)* Rhs: EntityFilter> BitOr<Rhs> for $ty {
            type Output = Or<Self, Rhs>;

            fn bitor(self, rhs: Rhs) -> Self::Output {
                Or(self, rhs)
            }
        }

        impl<$($gen)*> ops::Not for $ty {
            type Output = Not<Self>;

            fn not(self) -> Self::Output {
                Not(self)
            }
        }
    )*};
}

impl_filter_ops!(
    [T: Component,] Exists<T>,
    [S: ComponentSet,] ExistsAll<S>,
    [S: ComponentSet,] ExistsAny<S>,
    [] Always,
    [F: EntityFilter,] Not<F>,
    [A: EntityFilter, B: EntityFilter,] And<A, B>,
    [A: EntityFilter, B: EntityFilter,] Or<A, B>,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Position;

    #[derive(Clone)]
    struct Velocity(#[allow(dead_code)] u8);

    #[derive(Clone)]
    struct Frozen;

    fn setup() -> (Registry, EntityId, EntityId, EntityId) {
        let registry = Registry::new();
        let still = registry.create_entity().unwrap();
        let moving = registry.create_entity().unwrap();
        let frozen = registry.create_entity().unwrap();

        registry.assign_component(still, Position).unwrap();
        registry.assign_component(moving, Position).unwrap();
        registry.assign_component(moving, Velocity(1)).unwrap();
        registry.assign_component(frozen, Velocity(0)).unwrap();
        registry.assign_component(frozen, Frozen).unwrap();
        (registry, still, moving, frozen)
    }

    #[test]
    fn test_primitives() {
        let (registry, still, moving, frozen) = setup();

        assert!(exists::<Position>().matches(&registry, still));
        assert!(!exists::<Position>().matches(&registry, frozen));
        assert!(exists_all::<(Position, Velocity)>().matches(&registry, moving));
        assert!(!exists_all::<(Position, Velocity)>().matches(&registry, still));
        assert!(exists_any::<(Frozen, Position)>().matches(&registry, frozen));
        assert!(!exists_any::<(Frozen, Velocity)>().matches(&registry, still));
        assert!(always(true).matches(&registry, still));
        assert!(!always(false).matches(&registry, still));
    }

    #[test]
    fn test_empty_sets() {
        let (registry, still, _, _) = setup();
        assert!(exists_all::<()>().matches(&registry, still));
        assert!(!exists_any::<()>().matches(&registry, still));
    }

    #[test]
    fn test_combinators() {
        let (registry, still, moving, frozen) = setup();
        let active = exists::<Velocity>() & !exists::<Frozen>();

        assert!(!active.matches(&registry, still));
        assert!(active.matches(&registry, moving));
        assert!(!active.matches(&registry, frozen));

        let either = exists::<Frozen>() | exists::<Position>();
        assert!(either.matches(&registry, still));
        assert!(either.matches(&registry, frozen));
    }

    #[test]
    fn test_triviality() {
        assert!(().is_trivial());
        assert!(always(true).is_trivial());
        assert!(!always(false).is_trivial());
        assert!((always(true) & always(true)).is_trivial());
        assert!(!(always(true) & exists::<Frozen>()).is_trivial());
        assert!((exists::<Frozen>() | always(true)).is_trivial());
        assert!(!(!always(false)).is_trivial());
        assert!((&always(true)).is_trivial());
    }
}
