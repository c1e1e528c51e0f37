//! Backend tunables resolved from layered configuration.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::GridError;

/// Well-known option names.
pub mod names {
    /// Column holding the optimistic-lock version of a tuple.
    pub const VERSION_COLUMN: &str = "version_column";
    /// Overrides the configured association storage for one association.
    pub const ASSOCIATION_STORAGE: &str = "association_storage";
}

/// A named option layer.
pub type OptionLayer = HashMap<String, JsonValue>;

/// Options visible to one dialect call.
///
/// Layers are ordered from lowest to highest priority: the global layer from
/// configuration, then entity-level, then property-level overrides. Lookups
/// return the value from the highest-priority layer defining the option.
#[derive(Debug, Clone, Default)]
pub struct OptionsContext {
    layers: Vec<Arc<OptionLayer>>,
}

impl OptionsContext {
    /// A context with only the global layer.
    pub fn global(layer: impl Into<Arc<OptionLayer>>) -> Self {
        Self {
            layers: vec![layer.into()],
        }
    }

    /// Returns a copy with `layer` added on top.
    pub fn with_layer(&self, layer: impl Into<Arc<OptionLayer>>) -> Self {
        let mut layers = self.layers.clone();
        layers.push(layer.into());
        Self { layers }
    }

    /// Returns a copy with a single option overridden on top.
    pub fn with_option<T: Serialize>(&self, name: &str, value: T) -> Result<Self, GridError> {
        let mut layer = OptionLayer::new();
        layer.insert(name.to_string(), serde_json::to_value(value)?);
        Ok(self.with_layer(layer))
    }

    pub fn get_raw(&self, name: &str) -> Option<&JsonValue> {
        self.layers.iter().rev().find_map(|layer| layer.get(name))
    }

    /// Resolves an option, deserializing to the requested type.
    ///
    /// # Errors
    ///
    /// Returns an error if the option exists but does not deserialize.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, GridError> {
        match self.get_raw(name) {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }

    /// Resolves an option, falling back to `default` when no layer sets it.
    pub fn get_or<T: DeserializeOwned>(&self, name: &str, default: T) -> Result<T, GridError> {
        Ok(self.get(name)?.unwrap_or(default))
    }
}
