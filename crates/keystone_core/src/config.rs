//! # Registry Configuration
//!
//! Initial capacities, loaded from TOML or built in code:
//!
//! ```toml
//! entity_capacity = 65536
//! storage_capacity = 4096
//! ```
//!
//! Missing keys take their defaults; unknown keys are rejected.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ecs::entity::INDEX_MASK;
use crate::error::{RegistryError, RegistryResult};

/// Default capacity of the entity allocator.
pub const DEFAULT_ENTITY_CAPACITY: usize = 1024;

/// Default capacity of each new component storage.
pub const DEFAULT_STORAGE_CAPACITY: usize = 256;

/// Registry sizing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Live identifiers the allocator can track before growing.
    pub entity_capacity: usize,
    /// Records each component storage holds before growing.
    pub storage_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            entity_capacity: DEFAULT_ENTITY_CAPACITY,
            storage_capacity: DEFAULT_STORAGE_CAPACITY,
        }
    }
}

impl RegistryConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] on malformed TOML, unknown
    /// keys or out-of-range values.
    pub fn from_toml_str(source: &str) -> RegistryResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| RegistryError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] if the file cannot be read,
    /// or as [`RegistryConfig::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|e| {
            RegistryError::InvalidConfig(format!("{}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks that no capacity exceeds the entity index space.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> RegistryResult<()> {
        let limit = INDEX_MASK as usize;
        for (field, value) in [
            ("entity_capacity", self.entity_capacity),
            ("storage_capacity", self.storage_capacity),
        ] {
            if value > limit {
                return Err(RegistryError::InvalidConfig(format!(
                    "{field} = {value} exceeds the entity index space ({limit})"
                )));
            }
        }
        Ok(())
    }
}
