//! # Component System
//!
//! Components are plain data attached to entities. Any `Clone + Send + Sync`
//! type with a `'static` lifetime qualifies; there is nothing to derive.
//!
//! Zero-size types are *marker* components: their storage tracks presence
//! only and hands out one shared placeholder value.

use std::mem;

/// Marker trait for ECS components.
///
/// Components must be:
/// - `Clone`: entities can be duplicated with all their components
/// - `Send + Sync`: storages are shared across threads behind locks
/// - `'static`: types are keyed by `TypeId`
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Debug, PartialEq)]
/// struct Position {
///     x: i32,
///     y: i32,
/// }
///
/// #[derive(Clone)]
/// struct Frozen; // marker: no per-entity payload
/// ```
pub trait Component: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Component for T {}

/// Returns `true` if `T` is a zero-size marker component.
#[inline]
#[must_use]
pub const fn is_marker<T: Component>() -> bool {
    mem::size_of::<T>() == 0
}
