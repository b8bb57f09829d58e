//! Immutable metadata bundle attached to every persisted [`Entry`](crate::entry::Entry).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Free-form key/value bag, plus two distinguished fields (`value`, `operation`)
/// that show up often enough in domain records to deserve first-class slots
/// rather than living in `properties` like everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    properties: HashMap<String, String>,

    #[serde(default)]
    value: String,

    #[serde(default)]
    operation: String,
}

impl Metadata {
    /// An empty `Metadata` with no properties, value or operation.
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a new `Metadata` from its three constituents.
    pub fn new(properties: HashMap<String, String>, value: String, operation: String) -> Self {
        Self {
            properties,
            value,
            operation,
        }
    }

    /// Returns `true` if this instance carries no information at all.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.value.is_empty() && self.operation.is_empty()
    }

    /// The distinguished `value` field.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The distinguished `operation` field.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Looks up a property by name.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Returns the full property mapping.
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Returns a copy of this `Metadata` with the given property set.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns a copy of this `Metadata` with `value` set.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    /// Returns a copy of this `Metadata` with `operation` set.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }
}
