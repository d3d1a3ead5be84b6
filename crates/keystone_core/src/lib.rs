//! # KEYSTONE Core
//!
//! In-memory entity/component storage engine built on sparse sets:
//! - O(1) component insert, erase and lookup
//! - Versioned entity identifiers with slot recycling
//! - Per-type storages behind independent reader/writer locks
//! - Driver/probe joins over any tuple of component types
//!
//! ## Architecture Rules
//!
//! 1. **Packed storage** - Every component type lives in a gap-free dense array
//! 2. **Lazy storages** - A type's storage is created on its first assignment
//! 3. **Fixed lock order** - Entity lock, then storage map, then storages
//!
//! ## Example
//!
//! ```rust,ignore
//! use keystone_core::{exists, Registry};
//!
//! let registry = Registry::new();
//! let e = registry.create_entity()?;
//! registry.assign_component(e, Position { x: 1, y: 2 })?;
//! registry.assign_component(e, Velocity { x: 3, y: 4 })?;
//!
//! registry.for_joined_components_mut::<(Position, Velocity)>(
//!     |_, (p, v)| {
//!         p.x += v.x;
//!         p.y += v.y;
//!     },
//!     !exists::<Frozen>(),
//! );
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod memory;
pub mod sparse;
pub mod sync;

pub use config::RegistryConfig;
pub use ecs::{
    always, exists, exists_all, exists_any,
    Component, ComponentSet, EntityFilter, EntityId, FamilyId, Registry,
};
pub use error::{RegistryError, RegistryResult};
pub use memory::MemoryUsage;
pub use sparse::{SparseMap, SparseSet};
