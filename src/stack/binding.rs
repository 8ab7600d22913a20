//! Layer bindings: one layer reference plus the raw values bound to it.

use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::args::{ArgAction, BoundArgs};
use crate::error::{ValidationError, ValidationErrorKind};
use crate::layer::LayerDefinition;

/// A layer placed in a stack.
///
/// Values are stored raw, exactly as they will be persisted; parsing happens
/// in [`LayerBinding::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct LayerBinding {
    layer: Arc<LayerDefinition>,
    args: Vec<Option<Value>>,
    extra_args: Vec<Value>,
    kwargs: Map<String, Value>,
    unknown: Map<String, Value>,
    enabled: bool,
}

impl LayerBinding {
    pub fn new(layer: Arc<LayerDefinition>) -> Self {
        let args = vec![None; layer.args().len()];
        Self {
            layer,
            args,
            extra_args: Vec::new(),
            kwargs: Map::new(),
            unknown: Map::new(),
            enabled: true,
        }
    }

    pub fn layer(&self) -> &Arc<LayerDefinition> {
        &self.layer
    }

    pub fn uuid(&self) -> Uuid {
        self.layer.uuid()
    }

    pub fn name(&self) -> &str {
        self.layer.name()
    }

    pub fn version(&self) -> &str {
        self.layer.version()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Raw positional values, one slot per declared argument.
    pub fn raw_args(&self) -> &[Option<Value>] {
        &self.args
    }

    /// Raw keyword values actually supplied.
    pub fn raw_kwargs(&self) -> &Map<String, Value> {
        &self.kwargs
    }

    /// Positional values bound past the declared arguments.
    pub fn extra_args(&self) -> &[Value] {
        &self.extra_args
    }

    /// Values bound under names the layer does not declare.
    pub fn unknown_args(&self) -> &Map<String, Value> {
        &self.unknown
    }

    /// Raw value bound to `name`, positional first.
    pub fn raw(&self, name: &str) -> Option<&Value> {
        match self.layer.arg_index(name) {
            Some(i) => self.args[i].as_ref(),
            None => self.kwargs.get(name).or_else(|| self.unknown.get(name)),
        }
    }

    /// Bind `value` to the argument called `name`.
    ///
    /// Positional names take precedence over keyword names. `null` unsets a
    /// positional value and resets a keyword to its default. Names the layer
    /// does not declare are kept and reported by [`resolve`](Self::resolve).
    pub fn set_argument(&mut self, name: &str, value: Value) {
        if let Some(index) = self.layer.arg_index(name) {
            self.set_arg(index, value);
        } else if self.layer.kwarg(name).is_some() {
            self.set_kwarg(name, value);
        } else if value.is_null() {
            self.unknown.remove(name);
        } else {
            self.unknown.insert(name.to_string(), value);
        }
    }

    /// Bind the positional value at `index`. Values past the declared
    /// arguments are kept as extras.
    pub fn set_arg(&mut self, index: usize, value: Value) {
        let value = (!value.is_null()).then_some(value);
        match self.args.get_mut(index) {
            Some(slot) => *slot = value,
            None => {
                if let Some(value) = value {
                    self.extra_args.push(value);
                }
            }
        }
    }

    /// Bind positional values in order.
    pub fn set_args(&mut self, values: impl IntoIterator<Item = Value>) {
        for (index, value) in values.into_iter().enumerate() {
            self.set_arg(index, value);
        }
    }

    /// Bind a keyword value, honoring the descriptor's action.
    pub fn set_kwarg(&mut self, name: &str, value: Value) {
        if value.is_null() {
            self.kwargs.remove(name);
            return;
        }
        let append = self
            .layer
            .kwarg(name)
            .map_or(false, |k| k.get_action() == ArgAction::Append);
        if !append {
            self.kwargs.insert(name.to_string(), value);
            return;
        }
        let entry = self
            .kwargs
            .entry(name.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            *entry = Value::Array(vec![entry.take()]);
        }
        if let Value::Array(items) = entry {
            match value {
                Value::Array(values) => items.extend(values),
                single => items.push(single),
            }
        }
    }

    /// Store a keyword value as persisted, bypassing the append action.
    pub(crate) fn restore_kwarg(&mut self, name: &str, value: Value) {
        if !value.is_null() {
            self.kwargs.insert(name.to_string(), value);
        }
    }

    /// Store the realigned positional slots read from a document.
    pub(crate) fn restore_args(&mut self, args: Vec<Option<Value>>) {
        self.args = args;
        self.args.resize(self.layer.args().len(), None);
    }

    pub(crate) fn restore_extra_args(&mut self, values: Vec<Value>) {
        self.extra_args.extend(values.into_iter().filter(|v| !v.is_null()));
    }

    /// Every required positional argument has a value.
    pub fn is_complete(&self) -> bool {
        self.layer
            .args()
            .iter()
            .zip(&self.args)
            .all(|(descriptor, raw)| raw.is_some() || !descriptor.is_required())
    }

    /// Resolve the bound values against the layer's descriptors, collecting
    /// every problem. `index` locates the errors in the stack.
    pub fn resolve(&self, index: usize) -> Result<BoundArgs, Vec<ValidationError>> {
        let layer = self.layer.name();
        let mut bound = BoundArgs::new();
        let mut errors = Vec::new();

        for (descriptor, raw) in self.layer.args().iter().zip(&self.args) {
            match descriptor.resolve(raw.as_ref()) {
                Ok(value) => bound.push_positional(descriptor.name(), value),
                Err(e) => errors.push(e.at(index, layer)),
            }
        }
        if !self.extra_args.is_empty() {
            errors.push(
                ValidationError::new(
                    "*",
                    ValidationErrorKind::ExtraPositional {
                        count: self.extra_args.len(),
                    },
                )
                .at(index, layer),
            );
        }
        for descriptor in self.layer.kwargs() {
            match descriptor.resolve(self.kwargs.get(descriptor.name())) {
                Ok(value) => bound.insert_keyword(descriptor.name(), value),
                Err(e) => errors.push(e.at(index, layer)),
            }
        }
        for name in self.unknown.keys() {
            errors.push(
                ValidationError::new(name.clone(), ValidationErrorKind::UnknownArgument)
                    .at(index, layer),
            );
        }

        if errors.is_empty() {
            Ok(bound)
        } else {
            Err(errors)
        }
    }
}
