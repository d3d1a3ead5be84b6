//! # Entity Component System
//!
//! A sparse-set ECS: one packed storage per component type, keyed by
//! versioned entity identifiers.
//!
//! ## Design Philosophy
//!
//! - Components are stored in dense arrays for cache efficiency
//! - Insert, erase and lookup are O(1) through sparse index arrays
//! - Entity IDs are indices with version counters, recycled LIFO
//! - Storages are created lazily and locked independently

mod component;
pub mod entity;
pub mod family;
pub mod filter;
mod query;
mod registry;
mod storage;

pub use component::{is_marker, Component};
pub use entity::{EntityAllocator, EntityId, EntityIdIndexer};
pub use family::{FamilyId, TypeRegistry};
pub use filter::{always, exists, exists_all, exists_any, EntityFilter};
pub use query::ComponentSet;
pub use registry::Registry;
pub use storage::{AnyStorage, ComponentStorage};
