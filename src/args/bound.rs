//! Fully resolved argument values handed to a layer's `apply`.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{LayerError, LayerResult};

/// Typed positional and keyword values for one binding, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs {
    names: Vec<String>,
    positional: Vec<Value>,
    keyword: Map<String, Value>,
}

impl BoundArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_positional(&mut self, name: &str, value: Value) {
        self.names.push(name.to_string());
        self.positional.push(value);
    }

    pub(crate) fn insert_keyword(&mut self, name: &str, value: Value) {
        self.keyword.insert(name.to_string(), value);
    }

    /// Positional value at `index`.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.keyword.get(name)
    }

    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.keyword
    }

    /// Look up an argument by name, positional first.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.positional.get(i))
            .or_else(|| self.keyword.get(name))
    }

    /// Look up an argument by name and deserialize it.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> LayerResult<T> {
        let value = self
            .get(name)
            .ok_or_else(|| LayerError::ArgumentError(format!("no argument named '{}'", name)))?;
        serde_json::from_value(value.clone()).map_err(|e| {
            LayerError::ArgumentError(format!("argument '{}' has the wrong shape: {}", name, e))
        })
    }
}
