//! # Registry Error Types
//!
//! Contract violations surfaced by the storage engine.
//!
//! Expected absence (an optional component, a dead entity on a boolean
//! accessor) is never an error here: it is reported through `Option` or
//! `bool`. Only strict accessors and exhausted resources produce a
//! [`RegistryError`].

use thiserror::Error;

use crate::ecs::EntityId;

/// Errors that can occur in the storage engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A strict sparse set / sparse map accessor was called for a missing value.
    #[error("sparse set: value not found")]
    ValueNotFound,

    /// The sparse slot of the inserted value is held by a different member.
    #[error("sparse set: slot occupied by another value")]
    SlotOccupied,

    /// A strict component accessor was called for a component the entity lacks.
    #[error("registry: component not found")]
    ComponentNotFound,

    /// The entity identifier is not (or no longer) alive in this registry.
    #[error("registry: entity {0} is not alive")]
    DeadEntity(EntityId),

    /// Every representable entity index has been handed out.
    #[error("registry: entity index space exhausted")]
    IndexSpaceExhausted,

    /// The capacity growth helper was asked for an impossible range.
    #[error("invalid capacity range: min {min} > max {max}")]
    InvalidCapacityRange {
        /// Requested minimum size.
        min: usize,
        /// Hard upper bound.
        max: usize,
    },

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
