//! Saving and loading stacks, and resolving their layer references.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::checksum::sha256_hex;
use super::document::{ArgValueDocument, BindingDocument, StackDocument};
use super::format::DocumentFormat;
use crate::error::{LayerStackError, StackResult};
use crate::layer::{LayerDefinition, LayerRegistry};
use crate::stack::{LayerBinding, Stack};

/// What to do when a saved layer version differs from the registered one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionPolicy {
    /// Load anyway and report a [`ResolutionWarning::VersionMismatch`].
    #[default]
    Warn,
    /// Refuse to load with [`LayerStackError::VersionMismatch`].
    Deny,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodecConfig {
    #[serde(default)]
    pub version_policy: VersionPolicy,
}

/// Non-fatal findings while resolving a document against a registry.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionWarning {
    VersionMismatch {
        index: usize,
        uuid: Uuid,
        saved: String,
        registered: String,
    },
    NameChanged {
        index: usize,
        saved: String,
        current: String,
    },
    /// The declaration changed without a version bump.
    ChecksumChanged { index: usize, layer: String },
    ArgumentMoved {
        index: usize,
        argument: String,
        from: usize,
        to: usize,
    },
    /// A saved value was placed by position under a different name.
    ArgumentRealigned {
        index: usize,
        saved_name: String,
        argument: String,
    },
    ArgumentDropped {
        index: usize,
        argument: String,
        value: Value,
    },
    KwargDropped {
        index: usize,
        argument: String,
        value: Value,
    },
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionWarning::VersionMismatch {
                index,
                uuid,
                saved,
                registered,
            } => write!(
                f,
                "binding {}: layer {} was saved at version {} but version {} is loaded",
                index, uuid, saved, registered
            ),
            ResolutionWarning::NameChanged {
                index,
                saved,
                current,
            } => write!(
                f,
                "binding {}: layer '{}' is now called '{}'",
                index, saved, current
            ),
            ResolutionWarning::ChecksumChanged { index, layer } => write!(
                f,
                "binding {}: declaration of '{}' changed without a version change",
                index, layer
            ),
            ResolutionWarning::ArgumentMoved {
                index,
                argument,
                from,
                to,
            } => write!(
                f,
                "binding {}: argument '{}' moved from position {} to {}",
                index, argument, from, to
            ),
            ResolutionWarning::ArgumentRealigned {
                index,
                saved_name,
                argument,
            } => write!(
                f,
                "binding {}: value saved as '{}' bound to '{}' by position",
                index, saved_name, argument
            ),
            ResolutionWarning::ArgumentDropped {
                index,
                argument,
                value,
            } => write!(
                f,
                "binding {}: dropped value {} of argument '{}'",
                index, value, argument
            ),
            ResolutionWarning::KwargDropped {
                index,
                argument,
                value,
            } => write!(
                f,
                "binding {}: dropped value {} of undeclared keyword '{}'",
                index, value, argument
            ),
        }
    }
}

/// A deserialized stack and everything noticed while resolving it.
#[derive(Debug, Clone)]
pub struct LoadedStack {
    pub stack: Stack,
    pub warnings: Vec<ResolutionWarning>,
}

#[derive(Debug, Clone, Default)]
pub struct StackCodec {
    config: CodecConfig,
}

impl StackCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Emit layer references and raw argument values for every binding.
    pub fn serialize(&self, stack: &Stack) -> StackDocument {
        StackDocument {
            name: stack.name().to_string(),
            uuid: stack.uuid(),
            version: stack.version().to_string(),
            run_dir: stack.run_dir().map(Path::to_path_buf),
            model: stack.model().map(Path::to_path_buf),
            checksum: None,
            layers: stack.bindings().iter().map(serialize_binding).collect(),
        }
    }

    /// Rebuild a stack, resolving each binding against `registry`.
    pub fn deserialize<M>(
        &self,
        document: StackDocument,
        registry: &LayerRegistry<M>,
    ) -> StackResult<LoadedStack>
    where
        M: Send + Sync + 'static,
    {
        let mut stack = Stack::with_uuid(document.name, document.uuid);
        stack.set_version(document.version);
        stack.set_run_dir(document.run_dir);
        stack.set_model(document.model);

        let mut warnings = Vec::new();
        for (index, saved) in document.layers.into_iter().enumerate() {
            let definition =
                registry
                    .definition(&saved.uuid)
                    .ok_or_else(|| LayerStackError::UnresolvedLayer {
                        uuid: saved.uuid,
                        name: saved.name.clone(),
                        version: saved.version.clone(),
                    })?;
            self.check_identity(index, &saved, &definition, &mut warnings)?;

            let mut binding = LayerBinding::new(definition.clone());
            binding.set_enabled(saved.enabled);
            binding.restore_args(realign_args(index, &definition, saved.args, &mut warnings));
            for (name, value) in saved.kwargs {
                if definition.kwarg(&name).is_some() {
                    binding.restore_kwarg(&name, value);
                } else {
                    tracing::warn!(
                        binding = index,
                        layer = %definition.name(),
                        argument = %name,
                        "Dropping saved keyword the layer no longer declares"
                    );
                    warnings.push(ResolutionWarning::KwargDropped {
                        index,
                        argument: name,
                        value,
                    });
                }
            }
            // Undeclared values stay on the binding so validation still
            // reports them.
            binding.restore_extra_args(saved.extra_args);
            for (name, value) in saved.unknown {
                binding.set_argument(&name, value);
            }
            stack.push_binding(binding);
        }
        Ok(LoadedStack { stack, warnings })
    }

    fn check_identity(
        &self,
        index: usize,
        saved: &BindingDocument,
        definition: &LayerDefinition,
        warnings: &mut Vec<ResolutionWarning>,
    ) -> StackResult<()> {
        if saved.version != definition.version() {
            if self.config.version_policy == VersionPolicy::Deny {
                return Err(LayerStackError::VersionMismatch {
                    uuid: saved.uuid,
                    saved: saved.version.clone(),
                    registered: definition.version().to_string(),
                });
            }
            tracing::warn!(
                binding = index,
                layer = %definition.name(),
                saved = %saved.version,
                registered = %definition.version(),
                "Layer version differs from the saved one"
            );
            warnings.push(ResolutionWarning::VersionMismatch {
                index,
                uuid: saved.uuid,
                saved: saved.version.clone(),
                registered: definition.version().to_string(),
            });
        } else if let (Some(saved_sum), Some(current)) = (&saved.checksum, definition.checksum()) {
            if saved_sum != current {
                tracing::info!(
                    binding = index,
                    layer = %definition.name(),
                    "Layer declaration changed but its version did not"
                );
                warnings.push(ResolutionWarning::ChecksumChanged {
                    index,
                    layer: definition.name().to_string(),
                });
            }
        }
        if saved.name != definition.name() {
            tracing::info!(
                binding = index,
                saved = %saved.name,
                current = %definition.name(),
                "Layer name changed"
            );
            warnings.push(ResolutionWarning::NameChanged {
                index,
                saved: saved.name.clone(),
                current: definition.name().to_string(),
            });
        }
        Ok(())
    }

    /// Render `stack` as document text.
    ///
    /// TOML cannot store null, so a raw value that contains one (for
    /// example `{"a": null}`) is rejected with an error naming the binding
    /// and argument. Save such stacks as JSON or YAML.
    pub fn render(&self, stack: &Stack, format: DocumentFormat) -> StackResult<String> {
        let document = self.serialize(stack);
        if format == DocumentFormat::Toml {
            if let Some((index, argument)) = first_null_value(&document) {
                return Err(LayerStackError::Codec(format!(
                    "binding {} ({}): argument '{}' holds a null, which TOML cannot store",
                    index, document.layers[index].name, argument
                )));
            }
        }
        format.emit(&document)
    }

    pub fn parse<M>(
        &self,
        content: &str,
        format: DocumentFormat,
        registry: &LayerRegistry<M>,
    ) -> StackResult<LoadedStack>
    where
        M: Send + Sync + 'static,
    {
        self.deserialize(format.parse(content)?, registry)
    }

    /// Write `stack` to `path`, choosing the format from the extension
    /// (JSON when unknown). See [`render`](Self::render) for the TOML null
    /// restriction.
    pub fn save(&self, stack: &Stack, path: &Path) -> StackResult<()> {
        let format = DocumentFormat::from_path(path).unwrap_or_default();
        let text = self.render(stack, format)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text)?;
        tracing::debug!(path = %path.display(), "Saved stack");
        Ok(())
    }

    pub fn load<M>(&self, path: &Path, registry: &LayerRegistry<M>) -> StackResult<LoadedStack>
    where
        M: Send + Sync + 'static,
    {
        let format = DocumentFormat::from_path(path).unwrap_or_default();
        let content = fs::read_to_string(path)?;
        let loaded = self.parse(&content, format, registry)?;
        tracing::debug!(
            path = %path.display(),
            stack = %loaded.stack.name(),
            bindings = loaded.stack.len(),
            "Loaded stack"
        );
        Ok(loaded)
    }

    /// Write a JSON archive carrying the checksum of its own checksum-free
    /// content. Returns the checksum.
    pub fn archive(&self, stack: &Stack, path: &Path) -> StackResult<String> {
        let mut document = self.serialize(stack);
        let checksum = document_checksum(&document)?;
        document.checksum = Some(checksum.clone());
        let text = DocumentFormat::Json.emit(&document)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text)?;
        tracing::debug!(path = %path.display(), checksum = %checksum, "Archived stack");
        Ok(checksum)
    }

    /// Whether an archive still matches its recorded checksum.
    pub fn verify_archive(&self, path: &Path) -> StackResult<bool> {
        let content = fs::read_to_string(path)?;
        let mut document: StackDocument = DocumentFormat::Json.parse(&content)?;
        let Some(recorded) = document.checksum.take() else {
            return Ok(false);
        };
        Ok(document_checksum(&document)? == recorded)
    }

    /// Load a stack, point it at a new run directory and/or model, and save
    /// it. Without `outfile` the copy lands next to the original with a `_`
    /// prefix. Returns where it was written.
    pub fn repoint<M>(
        &self,
        path: &Path,
        registry: &LayerRegistry<M>,
        run_dir: Option<PathBuf>,
        model: Option<PathBuf>,
        outfile: Option<&Path>,
    ) -> StackResult<PathBuf>
    where
        M: Send + Sync + 'static,
    {
        let LoadedStack { mut stack, .. } = self.load(path, registry)?;
        if run_dir.is_some() {
            stack.set_run_dir(run_dir);
        }
        if model.is_some() {
            stack.set_model(model);
        }
        let target = match outfile {
            Some(outfile) => outfile.to_path_buf(),
            None => {
                let file_name = path
                    .file_name()
                    .ok_or_else(|| {
                        LayerStackError::Config(format!("{} is not a file path", path.display()))
                    })?
                    .to_string_lossy();
                path.with_file_name(format!("_{}", file_name))
            }
        };
        self.save(&stack, &target)?;
        tracing::info!(from = %path.display(), to = %target.display(), "Repointed stack");
        Ok(target)
    }
}

impl Stack {
    /// Save with the default codec, format chosen by extension.
    pub fn save(&self, path: impl AsRef<Path>) -> StackResult<()> {
        StackCodec::default().save(self, path.as_ref())
    }

    /// Write a checksummed JSON archive. Returns the checksum.
    pub fn archive(&self, path: impl AsRef<Path>) -> StackResult<String> {
        StackCodec::default().archive(self, path.as_ref())
    }

    pub fn load<M>(path: impl AsRef<Path>, registry: &LayerRegistry<M>) -> StackResult<LoadedStack>
    where
        M: Send + Sync + 'static,
    {
        StackCodec::default().load(path.as_ref(), registry)
    }
}

fn serialize_binding(binding: &LayerBinding) -> BindingDocument {
    let layer = binding.layer();
    BindingDocument {
        name: layer.name().to_string(),
        uuid: layer.uuid(),
        version: layer.version().to_string(),
        checksum: layer.checksum().map(str::to_string),
        enabled: binding.is_enabled(),
        args: layer
            .args()
            .iter()
            .zip(binding.raw_args())
            .map(|(descriptor, raw)| ArgValueDocument {
                name: descriptor.name().to_string(),
                value: raw.clone(),
            })
            .collect(),
        kwargs: binding.raw_kwargs().clone(),
        extra_args: binding.extra_args().to_vec(),
        unknown: binding.unknown_args().clone(),
    }
}

/// First binding argument whose raw value contains a null anywhere.
fn first_null_value(document: &StackDocument) -> Option<(usize, String)> {
    fn has_null(value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Array(items) => items.iter().any(has_null),
            Value::Object(map) => map.values().any(has_null),
            _ => false,
        }
    }

    document.layers.iter().enumerate().find_map(|(index, layer)| {
        let positional = layer
            .args
            .iter()
            .filter(|arg| arg.value.as_ref().map_or(false, has_null))
            .map(|arg| arg.name.clone());
        let extra = layer
            .extra_args
            .iter()
            .any(has_null)
            .then(|| "*".to_string());
        let named = layer
            .kwargs
            .iter()
            .chain(&layer.unknown)
            .filter(|(_, value)| has_null(value))
            .map(|(name, _)| name.clone());
        positional
            .chain(extra)
            .chain(named)
            .next()
            .map(|argument| (index, argument))
    })
}

fn document_checksum(document: &StackDocument) -> StackResult<String> {
    let text = DocumentFormat::Json.emit(document)?;
    Ok(sha256_hex(text.as_bytes()))
}

/// Place saved positional values into the current declaration's slots:
/// exact position and name first, then by name, then by position.
fn realign_args(
    index: usize,
    definition: &LayerDefinition,
    saved: Vec<ArgValueDocument>,
    warnings: &mut Vec<ResolutionWarning>,
) -> Vec<Option<Value>> {
    let declared = definition.args();
    let mut slots: Vec<Option<Value>> = vec![None; declared.len()];
    let mut taken = vec![false; declared.len()];

    let mut unmatched = Vec::new();
    for (position, arg) in saved.into_iter().enumerate() {
        match declared.get(position) {
            Some(descriptor) if descriptor.name() == arg.name => {
                slots[position] = arg.value;
                taken[position] = true;
            }
            _ => unmatched.push((position, arg)),
        }
    }

    let mut leftovers = Vec::new();
    for (position, arg) in unmatched {
        match definition.arg_index(&arg.name) {
            Some(to) if !taken[to] => {
                tracing::info!(
                    binding = index,
                    argument = %arg.name,
                    from = position,
                    to,
                    "Saved argument moved"
                );
                warnings.push(ResolutionWarning::ArgumentMoved {
                    index,
                    argument: arg.name,
                    from: position,
                    to,
                });
                slots[to] = arg.value;
                taken[to] = true;
            }
            _ => leftovers.push((position, arg)),
        }
    }

    for (position, arg) in leftovers {
        if position < declared.len() && !taken[position] {
            let argument = declared[position].name().to_string();
            tracing::warn!(
                binding = index,
                saved = %arg.name,
                argument = %argument,
                "Binding saved value by position"
            );
            warnings.push(ResolutionWarning::ArgumentRealigned {
                index,
                saved_name: arg.name,
                argument,
            });
            slots[position] = arg.value;
            taken[position] = true;
        } else if let Some(value) = arg.value {
            tracing::warn!(
                binding = index,
                argument = %arg.name,
                "Dropping saved argument that no longer fits"
            );
            warnings.push(ResolutionWarning::ArgumentDropped {
                index,
                argument: arg.name,
                value,
            });
        }
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{ArgDescriptor, BoundArgs};
    use crate::error::LayerResult;
    use crate::layer::{LayerContext, LayerImpl, ModelFreeLayer};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    struct Noop;

    #[async_trait]
    impl ModelFreeLayer for Noop {
        async fn apply(&self, _ctx: &LayerContext, _args: &BoundArgs) -> LayerResult<bool> {
            Ok(true)
        }
    }

    fn definition(uuid: Uuid, version: &str, args: &[&str]) -> LayerDefinition {
        let mut builder = LayerDefinition::builder("Prep", uuid, version)
            .kwarg(ArgDescriptor::keyword("mode", json!("fast")));
        for arg in args {
            builder = builder.arg(ArgDescriptor::positional(*arg));
        }
        builder.build().unwrap()
    }

    fn registry_with(def: LayerDefinition) -> LayerRegistry<Value> {
        LayerRegistry::builder()
            .layer(def, LayerImpl::model_free(Noop))
            .build()
            .unwrap()
    }

    fn saved_stack(def: &LayerDefinition) -> Stack {
        let mut stack = Stack::new("Round Trip");
        stack.set_run_dir(Some(PathBuf::from("runs/one")));
        let binding = stack.push(Arc::new(def.clone()));
        binding.set_args([json!("a"), json!("b")]);
        binding.set_argument("mode", json!("slow"));
        stack.push(Arc::new(def.clone())).set_enabled(false);
        stack
    }

    #[test]
    fn test_round_trip_each_format() {
        let uuid = Uuid::new_v4();
        let def = definition(uuid, "0.1.0", &["first", "second"]);
        let registry = registry_with(def.clone());
        let stack = saved_stack(&def);
        let codec = StackCodec::default();
        for format in [DocumentFormat::Json, DocumentFormat::Yaml, DocumentFormat::Toml] {
            let text = codec.render(&stack, format).unwrap();
            let loaded = codec.parse(&text, format, &registry).unwrap();
            assert!(loaded.warnings.is_empty(), "{:?}", loaded.warnings);
            assert_eq!(loaded.stack.uuid(), stack.uuid());
            assert_eq!(loaded.stack.run_dir(), stack.run_dir());
            assert_eq!(codec.serialize(&loaded.stack), codec.serialize(&stack));
        }
    }

    #[test]
    fn test_unresolved_layer_names_uuid() {
        let def = definition(Uuid::new_v4(), "0.1.0", &["first"]);
        let stack = saved_stack(&def);
        let other = registry_with(definition(Uuid::new_v4(), "0.1.0", &[]));
        let codec = StackCodec::default();
        let err = codec.deserialize(codec.serialize(&stack), &other).unwrap_err();
        match err {
            LayerStackError::UnresolvedLayer { uuid, .. } => assert_eq!(uuid, def.uuid()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_undeclared_values_survive_round_trip() {
        let def = definition(Uuid::new_v4(), "0.1.0", &["first", "second"]);
        let registry = registry_with(def.clone());
        let mut stack = Stack::new("Draft");
        let binding = stack.push(Arc::new(def));
        binding.set_args([json!("a"), json!("b"), json!("extra")]);
        binding.set_argument("colour", json!("red"));
        assert_eq!(stack.validate().len(), 2);

        let codec = StackCodec::default();
        for format in [DocumentFormat::Json, DocumentFormat::Yaml, DocumentFormat::Toml] {
            let text = codec.render(&stack, format).unwrap();
            let loaded = codec.parse(&text, format, &registry).unwrap();
            let binding = &loaded.stack.bindings()[0];
            assert_eq!(binding.extra_args(), &[json!("extra")]);
            assert_eq!(binding.unknown_args().get("colour"), Some(&json!("red")));
            assert_eq!(loaded.stack.validate(), stack.validate());
        }
    }

    #[test]
    fn test_toml_rejects_nested_null_with_location() {
        let def = definition(Uuid::new_v4(), "0.1.0", &["first"]);
        let mut stack = Stack::new("Nulls");
        stack.push(Arc::new(def.clone())).set_argument("first", json!("ok"));
        stack
            .push(Arc::new(def))
            .set_argument("mode", json!({"a": null}));

        let codec = StackCodec::default();
        let message = codec
            .render(&stack, DocumentFormat::Toml)
            .unwrap_err()
            .to_string();
        assert!(message.contains("binding 1"), "{message}");
        assert!(message.contains("'mode'"), "{message}");
        assert!(codec.render(&stack, DocumentFormat::Json).is_ok());
    }

    #[test]
    fn test_version_mismatch_policy() {
        let uuid = Uuid::new_v4();
        let old = definition(uuid, "0.1.0", &["first"]);
        let registry = registry_with(definition(uuid, "0.2.0", &["first"]));
        let document = StackCodec::default().serialize(&saved_stack(&old));

        let loaded = StackCodec::default()
            .deserialize(document.clone(), &registry)
            .unwrap();
        assert!(matches!(
            loaded.warnings[0],
            ResolutionWarning::VersionMismatch { index: 0, .. }
        ));
        assert_eq!(loaded.stack.bindings()[0].version(), "0.2.0");

        let strict = StackCodec::new(CodecConfig {
            version_policy: VersionPolicy::Deny,
        });
        assert!(matches!(
            strict.deserialize(document, &registry),
            Err(LayerStackError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_realignment() {
        let uuid = Uuid::new_v4();
        let old = definition(uuid, "0.1.0", &["a", "b", "c"]);
        let mut stack = Stack::new("S");
        stack
            .push(Arc::new(old))
            .set_args([json!(1), json!(2), json!(3)]);
        let mut document = StackCodec::default().serialize(&stack);
        document.layers[0].kwargs.insert("gone".into(), json!(true));

        // "c" moved into slot 1, "a" was renamed to "x", "b" was removed.
        let registry = registry_with(definition(uuid, "0.1.0", &["x", "c"]));
        let loaded = StackCodec::default().deserialize(document, &registry).unwrap();
        let binding = &loaded.stack.bindings()[0];
        assert_eq!(binding.raw_args(), &[Some(json!(1)), Some(json!(3))]);
        assert_eq!(
            loaded.warnings,
            vec![
                ResolutionWarning::ArgumentMoved {
                    index: 0,
                    argument: "c".into(),
                    from: 2,
                    to: 1
                },
                ResolutionWarning::ArgumentRealigned {
                    index: 0,
                    saved_name: "a".into(),
                    argument: "x".into()
                },
                ResolutionWarning::ArgumentDropped {
                    index: 0,
                    argument: "b".into(),
                    value: json!(2)
                },
                ResolutionWarning::KwargDropped {
                    index: 0,
                    argument: "gone".into(),
                    value: json!(true)
                },
            ]
        );
    }

    #[test]
    fn test_archive_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let def = definition(Uuid::new_v4(), "0.1.0", &["first", "second"]);
        let stack = saved_stack(&def);
        let path = dir.path().join("stack.archive");
        let checksum = stack.archive(&path).unwrap();
        assert_eq!(checksum.len(), 64);
        let codec = StackCodec::default();
        assert!(codec.verify_archive(&path).unwrap());

        let tampered = fs::read_to_string(&path).unwrap().replace("slow", "fast");
        fs::write(&path, tampered).unwrap();
        assert!(!codec.verify_archive(&path).unwrap());
    }

    #[test]
    fn test_repoint_honors_version_policy() {
        let dir = tempfile::tempdir().unwrap();
        let uuid = Uuid::new_v4();
        let path = dir.path().join("prep.json");
        saved_stack(&definition(uuid, "0.1.0", &["first", "second"]))
            .save(&path)
            .unwrap();
        let bumped = registry_with(definition(uuid, "0.2.0", &["first", "second"]));

        let strict = StackCodec::new(CodecConfig {
            version_policy: VersionPolicy::Deny,
        });
        let err = strict
            .repoint(&path, &bumped, Some(PathBuf::from("runs/two")), None, None)
            .unwrap_err();
        assert!(matches!(err, LayerStackError::VersionMismatch { .. }));
        assert!(!dir.path().join("_prep.json").exists());

        let target = StackCodec::default()
            .repoint(&path, &bumped, Some(PathBuf::from("runs/two")), None, None)
            .unwrap();
        assert!(target.exists());
    }

    #[test]
    fn test_repoint_writes_prefixed_copy() {
        let dir = tempfile::tempdir().unwrap();
        let def = definition(Uuid::new_v4(), "0.1.0", &["first", "second"]);
        let registry = registry_with(def.clone());
        let path = dir.path().join("prep.yaml");
        saved_stack(&def).save(&path).unwrap();

        let target = StackCodec::default()
            .repoint(
                &path,
                &registry,
                Some(PathBuf::from("runs/two")),
                Some(PathBuf::from("models/base")),
                None,
            )
            .unwrap();
        assert_eq!(target, dir.path().join("_prep.yaml"));
        let loaded = Stack::load(&target, &registry).unwrap();
        assert_eq!(loaded.stack.run_dir(), Some(Path::new("runs/two")));
        assert_eq!(loaded.stack.model(), Some(Path::new("models/base")));
    }
}
