use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use super::binding::LayerBinding;
use crate::codec::DocumentFormat;
use crate::error::{LayerStackError, StackResult, ValidationError};
use crate::layer::LayerDefinition;

pub const DEFAULT_STACK_VERSION: &str = "v0.1.0";

/// An ordered sequence of layer bindings. Binding order is execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    name: String,
    uuid: Uuid,
    version: String,
    run_dir: Option<PathBuf>,
    model: Option<PathBuf>,
    bindings: Vec<LayerBinding>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_uuid(name, Uuid::new_v4())
    }

    /// A stack with a known identity, as when reloading a document.
    pub fn with_uuid(name: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            name: name.into(),
            uuid,
            version: DEFAULT_STACK_VERSION.to_string(),
            run_dir: None,
            model: None,
            bindings: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub fn run_dir(&self) -> Option<&Path> {
        self.run_dir.as_deref()
    }

    pub fn set_run_dir(&mut self, run_dir: Option<PathBuf>) {
        self.run_dir = run_dir;
    }

    /// Path of the starting model.
    pub fn model(&self) -> Option<&Path> {
        self.model.as_deref()
    }

    pub fn set_model(&mut self, model: Option<PathBuf>) {
        self.model = model;
    }

    pub fn bindings(&self) -> &[LayerBinding] {
        &self.bindings
    }

    pub fn binding(&self, index: usize) -> Option<&LayerBinding> {
        self.bindings.get(index)
    }

    pub fn binding_mut(&mut self, index: usize) -> StackResult<&mut LayerBinding> {
        let len = self.bindings.len();
        self.bindings
            .get_mut(index)
            .ok_or(LayerStackError::BindingOutOfRange { index, len })
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Insert a binding for `layer` at `position`, appending when `None`.
    /// Arguments are not validated here.
    pub fn add_binding(
        &mut self,
        layer: Arc<LayerDefinition>,
        position: Option<usize>,
    ) -> StackResult<&mut LayerBinding> {
        let len = self.bindings.len();
        let index = position.unwrap_or(len);
        if index > len {
            return Err(LayerStackError::BindingOutOfRange { index, len });
        }
        self.bindings.insert(index, LayerBinding::new(layer));
        Ok(&mut self.bindings[index])
    }

    /// Append a binding for `layer`.
    pub fn push(&mut self, layer: Arc<LayerDefinition>) -> &mut LayerBinding {
        self.bindings.push(LayerBinding::new(layer));
        let last = self.bindings.len() - 1;
        &mut self.bindings[last]
    }

    pub(crate) fn push_binding(&mut self, binding: LayerBinding) {
        self.bindings.push(binding);
    }

    pub fn remove_binding(&mut self, index: usize) -> StackResult<LayerBinding> {
        let len = self.bindings.len();
        if index >= len {
            return Err(LayerStackError::BindingOutOfRange { index, len });
        }
        Ok(self.bindings.remove(index))
    }

    /// Move the binding at `from` so it ends up at `to`.
    pub fn move_binding(&mut self, from: usize, to: usize) -> StackResult<()> {
        let len = self.bindings.len();
        for index in [from, to] {
            if index >= len {
                return Err(LayerStackError::BindingOutOfRange { index, len });
            }
        }
        let binding = self.bindings.remove(from);
        self.bindings.insert(to, binding);
        Ok(())
    }

    /// Store a raw value; validation is deferred to [`validate`](Self::validate).
    pub fn set_argument(
        &mut self,
        binding: usize,
        name: &str,
        value: serde_json::Value,
    ) -> StackResult<()> {
        self.binding_mut(binding)?.set_argument(name, value);
        Ok(())
    }

    pub fn enable(&mut self, binding: usize) -> StackResult<()> {
        self.binding_mut(binding)?.set_enabled(true);
        Ok(())
    }

    pub fn disable(&mut self, binding: usize) -> StackResult<()> {
        self.binding_mut(binding)?.set_enabled(false);
        Ok(())
    }

    /// Resolve every binding's arguments, collecting all errors.
    pub fn validate(&self) -> Vec<ValidationError> {
        self.bindings
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.resolve(i).err())
            .flatten()
            .collect()
    }

    /// A run directory is set and every enabled binding has its positional
    /// arguments.
    pub fn runnable(&self) -> bool {
        self.run_dir.is_some()
            && self
                .bindings
                .iter()
                .filter(|b| b.is_enabled())
                .all(|b| b.is_complete())
    }

    /// Lowercase name, spaces replaced with `_`, plus the format extension.
    pub fn suggested_filename(&self, format: DocumentFormat) -> String {
        format!(
            "{}.{}",
            self.name.to_lowercase().replace(' ', "_"),
            format.extension()
        )
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stack '{}' {} ({})", self.name, self.version, self.uuid)?;
        let show = |p: &Option<PathBuf>| {
            p.as_ref()
                .map_or_else(|| "<unset>".to_string(), |p| p.display().to_string())
        };
        writeln!(f, "  run_dir: {}", show(&self.run_dir))?;
        writeln!(f, "  model:   {}", show(&self.model))?;
        for (i, binding) in self.bindings.iter().enumerate() {
            let mark = if binding.is_enabled() { "x" } else { " " };
            writeln!(
                f,
                "  {:>2}. [{}] {} v{}: {}",
                i,
                mark,
                binding.name(),
                binding.version(),
                binding.layer().summary()
            )?;
            for (descriptor, raw) in binding.layer().args().iter().zip(binding.raw_args()) {
                match raw {
                    Some(value) => writeln!(f, "        {} = {}", descriptor.name(), value)?,
                    None => writeln!(f, "        {} = <unset>", descriptor.name())?,
                }
            }
            for (name, value) in binding.raw_kwargs() {
                writeln!(f, "        {}: {}", name, value)?;
            }
        }
        Ok(())
    }
}
