//! Layer definitions: the versioned, uuid-identified argument contract of a
//! unit of work.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::args::ArgDescriptor;
use crate::error::{LayerStackError, StackResult};

/// Whether a layer operates on a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Ignores the model and reports success or failure.
    #[default]
    ModelFree,
    /// Consumes and returns a model, checked by a model adapter first.
    Model,
}

/// Where a declaration was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSource {
    /// The layer's directory inside a layer library.
    pub dir: PathBuf,
    /// The declaration file inside `dir`.
    pub declaration: PathBuf,
    /// SHA-256 of the declaration file, lowercase hex.
    pub checksum: String,
}

/// Declaration of a layer: identity, version, and argument contract.
///
/// Inherited descriptors are flattened in at declaration time, so a
/// definition always carries its complete argument lists.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDefinition {
    name: String,
    uuid: Uuid,
    version: String,
    description: Option<String>,
    kind: LayerKind,
    base: Option<Uuid>,
    args: Vec<ArgDescriptor>,
    kwargs: Vec<ArgDescriptor>,
    source: Option<LayerSource>,
}

impl LayerDefinition {
    pub fn builder(
        name: impl Into<String>,
        uuid: Uuid,
        version: impl Into<String>,
    ) -> LayerDefinitionBuilder {
        LayerDefinitionBuilder {
            name: name.into(),
            uuid,
            version: version.into(),
            description: None,
            kind: LayerKind::ModelFree,
            base: None,
            inherited_args: 0,
            inherited_kwargs: 0,
            args: Vec::new(),
            kwargs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Description, or a generated one when none was declared.
    pub fn summary(&self) -> String {
        match (&self.description, self.kind) {
            (Some(d), _) => d.clone(),
            (None, LayerKind::ModelFree) => format!("Apply Layer '{}'", self.name),
            (None, LayerKind::Model) => format!("Apply Layer '{}' to model", self.name),
        }
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn is_model_layer(&self) -> bool {
        self.kind == LayerKind::Model
    }

    /// Uuid of the definition this one extends.
    pub fn base(&self) -> Option<Uuid> {
        self.base
    }

    /// Positional descriptors, inherited ones first.
    pub fn args(&self) -> &[ArgDescriptor] {
        &self.args
    }

    /// Keyword descriptors, inherited ones first.
    pub fn kwargs(&self) -> &[ArgDescriptor] {
        &self.kwargs
    }

    pub fn arg_index(&self, name: &str) -> Option<usize> {
        self.args.iter().position(|a| a.name() == name)
    }

    pub fn kwarg(&self, name: &str) -> Option<&ArgDescriptor> {
        self.kwargs.iter().find(|k| k.name() == name)
    }

    pub fn source(&self) -> Option<&LayerSource> {
        self.source.as_ref()
    }

    pub fn checksum(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.checksum.as_str())
    }

    pub(crate) fn with_source(mut self, source: LayerSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn into_shared(self) -> Arc<LayerDefinition> {
        Arc::new(self)
    }
}

/// Builder enforcing the declaration-time rules of a [`LayerDefinition`].
pub struct LayerDefinitionBuilder {
    name: String,
    uuid: Uuid,
    version: String,
    description: Option<String>,
    kind: LayerKind,
    base: Option<Uuid>,
    inherited_args: usize,
    inherited_kwargs: usize,
    args: Vec<ArgDescriptor>,
    kwargs: Vec<ArgDescriptor>,
}

impl LayerDefinitionBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn kind(mut self, kind: LayerKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn model_layer(self) -> Self {
        self.kind(LayerKind::Model)
    }

    /// Inherit the base definition's descriptors. A model base makes this a
    /// model layer too. Must be called before declaring own arguments.
    pub fn extends(mut self, base: &LayerDefinition) -> Self {
        self.base = Some(base.uuid);
        if base.kind == LayerKind::Model {
            self.kind = LayerKind::Model;
        }
        let own_args = std::mem::take(&mut self.args);
        let own_kwargs = std::mem::take(&mut self.kwargs);
        self.args = base.args.clone();
        self.kwargs = base.kwargs.clone();
        self.inherited_args = self.args.len();
        self.inherited_kwargs = self.kwargs.len();
        self.args.extend(own_args);
        self.kwargs.extend(own_kwargs);
        self
    }

    pub fn arg(mut self, arg: ArgDescriptor) -> Self {
        self.args.push(arg);
        self
    }

    pub fn kwarg(mut self, kwarg: ArgDescriptor) -> Self {
        self.kwargs.push(kwarg);
        self
    }

    pub fn build(self) -> StackResult<LayerDefinition> {
        if self.name.trim().is_empty() {
            return Err(self.invalid("layer name is empty"));
        }
        if parse_version(&self.version).is_none() {
            return Err(self.invalid(&format!(
                "version '{}' is not a MAJOR.MINOR.PATCH triple",
                self.version
            )));
        }
        if let Some(kwarg) = self.args.iter().find(|a| !a.is_positional()) {
            return Err(self.invalid(&format!(
                "keyword descriptor '{}' declared as positional",
                kwarg.name()
            )));
        }
        if let Some(arg) = self.kwargs.iter().find(|a| a.is_positional()) {
            return Err(self.invalid(&format!(
                "positional descriptor '{}' declared as keyword",
                arg.name()
            )));
        }
        check_unique(&self.name, &self.args, self.inherited_args, "positional")?;
        check_unique(&self.name, &self.kwargs, self.inherited_kwargs, "keyword")?;

        Ok(LayerDefinition {
            name: self.name,
            uuid: self.uuid,
            version: self.version,
            description: self.description,
            kind: self.kind,
            base: self.base,
            args: self.args,
            kwargs: self.kwargs,
            source: None,
        })
    }

    fn invalid(&self, reason: &str) -> LayerStackError {
        LayerStackError::InvalidDeclaration {
            source_name: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

fn check_unique(
    layer: &str,
    descriptors: &[ArgDescriptor],
    inherited: usize,
    namespace: &str,
) -> StackResult<()> {
    for (i, descriptor) in descriptors.iter().enumerate() {
        if let Some(first) = descriptors[..i]
            .iter()
            .position(|d| d.name() == descriptor.name())
        {
            let origin = if first < inherited {
                format!("{} argument already inherited from the base layer", namespace)
            } else {
                format!("{} argument declared twice", namespace)
            };
            return Err(LayerStackError::DuplicateArgument {
                layer: layer.to_string(),
                name: descriptor.name().to_string(),
                origin,
            });
        }
    }
    Ok(())
}

/// Parse `MAJOR.MINOR.PATCH`, tolerating a leading `v` and a `-pre` suffix.
pub fn parse_version(version: &str) -> Option<(u64, u64, u64)> {
    let trimmed = version.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    let core = trimmed.split(['-', '+']).next()?;
    let mut parts = core.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}
