// src/properties.rs - Named tunables advertised over the plugin ABI

//! The plugin property registry.
//!
//! Hosts discover a solver's tunables by asking for this registry as a
//! JSON array and adjust them by name. The registry itself is static
//! metadata; live values are read and written through the engine, which
//! range-checks against the bounds declared here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of registered properties.
pub const MAX_NUM_PROPERTIES: usize = 32;
/// Maximum property name length in bytes.
pub const MAX_PROPERTY_NAME_LENGTH: usize = 64;
/// Maximum property description length in bytes.
pub const MAX_PROPERTY_DESC_LENGTH: usize = 256;

/// Property-handling status codes, matching the ABI contract.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyError {
    /// No property with that name.
    #[error("property not found")]
    NotFound,
    /// Value outside the declared bounds.
    #[error("value outside property range")]
    OutsideRange,
    /// Caller buffer cannot hold the serialized registry.
    #[error("buffer too small")]
    BufferTooSmall,
    /// Name or description exceeds its limit, or the registry is full.
    #[error("property name or description too long")]
    TooLong,
    /// Per-device property addressed to a device that does not exist.
    #[error("invalid device")]
    InvalidDevice,
}

impl PropertyError {
    /// ABI return code for this status.
    pub fn code(self) -> i32 {
        match self {
            PropertyError::NotFound => 1,
            PropertyError::OutsideRange => 2,
            PropertyError::BufferTooSmall => 3,
            PropertyError::TooLong => 4,
            PropertyError::InvalidDevice => 5,
        }
    }
}

/// One advertised tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginProperty {
    /// Identifier used with get/set.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Default value.
    pub default_value: u32,
    /// Smallest accepted value.
    pub min_value: u32,
    /// Largest accepted value.
    pub max_value: u32,
    /// Whether the property is set per device rather than globally.
    /// Not part of the JSON contract.
    #[serde(skip)]
    pub is_per_device: bool,
}

/// A bounded collection of [`PluginProperty`] records.
#[derive(Debug, Clone, Default)]
pub struct PropertyRegistry {
    props: Vec<PluginProperty>,
}

impl PropertyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry this solver ships: its two live tunables.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry
            .add(PluginProperty {
                name: "NUM_THREADS_PARAM".to_string(),
                description: "Number of worker blocks the trimmer fans out over".to_string(),
                default_value: num_cpus::get() as u32,
                min_value: 1,
                max_value: 64,
                is_per_device: false,
            })
            .expect("standard registry fits");
        registry
            .add(PluginProperty {
                name: "NUM_TRIMS_PARAM".to_string(),
                description: "Number of trimming rounds; odd values are rounded down".to_string(),
                default_value: crate::params::NUM_TRIMS_PARAM,
                min_value: crate::params::COMPRESSROUND + 4,
                max_value: 256,
                is_per_device: false,
            })
            .expect("standard registry fits");
        registry
    }

    /// Register a property, enforcing the name, description and count
    /// limits.
    pub fn add(&mut self, prop: PluginProperty) -> Result<(), PropertyError> {
        if prop.name.len() > MAX_PROPERTY_NAME_LENGTH
            || prop.description.len() > MAX_PROPERTY_DESC_LENGTH
            || self.props.len() >= MAX_NUM_PROPERTIES
        {
            return Err(PropertyError::TooLong);
        }
        self.props.push(prop);
        Ok(())
    }

    /// Look a property up by name.
    pub fn get(&self, name: &str) -> Option<&PluginProperty> {
        self.props.iter().find(|p| p.name == name)
    }

    /// Number of registered properties.
    pub fn len(&self) -> usize {
        self.props.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Serialize the registry as the JSON array the ABI exposes.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.props)
    }
}
