//! Attribute/metadata registry.
//!
//! A string-keyed property bag used to tag tiles and layers with named
//! values (overlay texture handles, orientation markers, deployment
//! constants). The engine treats it as an opaque lookup service.
//!
//! Deliberately not a process-wide mutable table: the registry is built
//! once at startup through [`AttributeRegistryBuilder`] and immutable
//! afterwards, so lookups are lock-free and configuration is explicit in
//! the composition root.

use std::collections::HashMap;

/// Well-known registry keys.
///
/// Directional markers are used by layer configuration to tag oriented
/// resources (lighting direction, label anchors, panning presets).
pub mod well_known {
    /// Northward orientation marker.
    pub const NORTH: &str = "direction.north";
    /// Southward orientation marker.
    pub const SOUTH: &str = "direction.south";
    /// Eastward orientation marker.
    pub const EAST: &str = "direction.east";
    /// Westward orientation marker.
    pub const WEST: &str = "direction.west";
    /// Default overlay texture handle for terrain tiles.
    pub const TERRAIN_OVERLAY: &str = "layer.terrain.overlay";
}

/// A registry value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
    /// Opaque handle into an external resource table (e.g. a texture).
    Handle(u64),
}

/// Immutable string-keyed attribute store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeRegistry {
    values: HashMap<String, AttributeValue>,
}

impl AttributeRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Starts building a registry.
    pub fn builder() -> AttributeRegistryBuilder {
        AttributeRegistryBuilder::default()
    }

    /// Raw lookup.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.values.get(key)
    }

    /// Text value lookup; `None` when absent or a different type.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(AttributeValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Handle value lookup; `None` when absent or a different type.
    pub fn handle(&self, key: &str) -> Option<u64> {
        match self.values.get(key) {
            Some(AttributeValue::Handle(h)) => Some(*h),
            _ => None,
        }
    }

    /// Flag value lookup, defaulting to `false`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(AttributeValue::Flag(true)))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Builder for [`AttributeRegistry`]; consumed by `build()`.
#[derive(Debug, Default)]
pub struct AttributeRegistryBuilder {
    values: HashMap<String, AttributeValue>,
}

impl AttributeRegistryBuilder {
    /// Sets a value, replacing any previous entry for the key.
    pub fn set(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Convenience for text values.
    pub fn text(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, AttributeValue::Text(value.into()))
    }

    /// Convenience for handle values.
    pub fn handle(self, key: impl Into<String>, value: u64) -> Self {
        self.set(key, AttributeValue::Handle(value))
    }

    /// Finalizes the registry.
    pub fn build(self) -> AttributeRegistry {
        AttributeRegistry {
            values: self.values,
        }
    }
}
