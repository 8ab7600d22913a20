//! Layer registry: every layer definition available to a process, keyed by
//! uuid and bound to its implementation.
//!
//! Registries are built once (from programmatic registrations and one or
//! more layer library directories) and are read-only afterwards, so they can
//! be shared between concurrent runs behind an `Arc`.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use super::definition::{parse_version, LayerDefinition};
use super::executor::LayerImpl;
use super::manifest::{find_declaration, LayerManifest, LoadedManifest};
use crate::error::{LayerStackError, StackResult};

/// A definition together with the implementation that applies it.
pub struct RegisteredLayer<M>
where
    M: Send + Sync + 'static,
{
    definition: Arc<LayerDefinition>,
    implementation: LayerImpl<M>,
}

impl<M> RegisteredLayer<M>
where
    M: Send + Sync + 'static,
{
    pub fn definition(&self) -> &Arc<LayerDefinition> {
        &self.definition
    }

    pub fn implementation(&self) -> &LayerImpl<M> {
        &self.implementation
    }

    pub fn uuid(&self) -> Uuid {
        self.definition.uuid()
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn version(&self) -> &str {
        self.definition.version()
    }
}

/// Read-only lookup of registered layers.
pub struct LayerRegistry<M>
where
    M: Send + Sync + 'static,
{
    layers: HashMap<Uuid, RegisteredLayer<M>>,
    order: Vec<Uuid>,
}

impl<M> LayerRegistry<M>
where
    M: Send + Sync + 'static,
{
    pub fn builder() -> LayerRegistryBuilder<M> {
        LayerRegistryBuilder::new()
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&RegisteredLayer<M>> {
        self.layers.get(uuid)
    }

    pub fn definition(&self, uuid: &Uuid) -> Option<Arc<LayerDefinition>> {
        self.layers.get(uuid).map(|l| Arc::clone(&l.definition))
    }

    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.layers.contains_key(uuid)
    }

    /// Select a layer the way people do: by name and version.
    pub fn find(&self, name: &str, version: &str) -> Option<&RegisteredLayer<M>> {
        self.iter()
            .find(|l| l.name() == name && l.version() == version)
    }

    /// The highest registered version of the layer called `name`.
    pub fn find_latest(&self, name: &str) -> Option<&RegisteredLayer<M>> {
        self.iter()
            .filter(|l| l.name() == name)
            .max_by_key(|l| parse_version(l.version()).unwrap_or_default())
    }

    /// Registered layers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredLayer<M>> {
        self.order.iter().filter_map(|uuid| self.layers.get(uuid))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    fn insert(&mut self, definition: LayerDefinition, implementation: LayerImpl<M>) -> StackResult<()> {
        if definition.kind() != implementation.kind() {
            return Err(LayerStackError::InvalidDeclaration {
                source_name: definition.name().to_string(),
                reason: format!(
                    "declared as {:?} but its implementation is {:?}",
                    definition.kind(),
                    implementation.kind()
                ),
            });
        }
        let uuid = definition.uuid();
        if self.layers.contains_key(&uuid) {
            return Err(LayerStackError::DuplicateLayer(uuid));
        }
        tracing::debug!(layer = %definition.name(), uuid = %uuid, "Registered layer");
        self.order.push(uuid);
        self.layers.insert(
            uuid,
            RegisteredLayer {
                definition: Arc::new(definition),
                implementation,
            },
        );
        Ok(())
    }
}

/// Collects implementations, programmatic layers, and library directories.
pub struct LayerRegistryBuilder<M>
where
    M: Send + Sync + 'static,
{
    implementations: HashMap<String, LayerImpl<M>>,
    layers: Vec<(LayerDefinition, LayerImpl<M>)>,
    libraries: Vec<PathBuf>,
}

impl<M> Default for LayerRegistryBuilder<M>
where
    M: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> LayerRegistryBuilder<M>
where
    M: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            implementations: HashMap::new(),
            layers: Vec::new(),
            libraries: Vec::new(),
        }
    }

    /// Make an implementation available to library declarations under `name`.
    pub fn implementation(mut self, name: impl Into<String>, implementation: LayerImpl<M>) -> Self {
        self.implementations.insert(name.into(), implementation);
        self
    }

    /// Register a layer declared in code.
    pub fn layer(mut self, definition: LayerDefinition, implementation: LayerImpl<M>) -> Self {
        self.layers.push((definition, implementation));
        self
    }

    /// Add a layer library. Earlier libraries take precedence.
    pub fn library(mut self, dir: impl AsRef<Path>) -> Self {
        self.libraries.push(dir.as_ref().to_path_buf());
        self
    }

    pub fn libraries<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.libraries
            .extend(dirs.into_iter().map(|d| d.as_ref().to_path_buf()));
        self
    }

    pub fn build(self) -> StackResult<LayerRegistry<M>> {
        let mut registry = LayerRegistry {
            layers: HashMap::new(),
            order: Vec::new(),
        };
        for (definition, implementation) in self.layers {
            registry.insert(definition, implementation)?;
        }

        let pending = scan_libraries(&self.libraries, &registry)?;
        let manifests: HashMap<Uuid, &LoadedManifest> =
            pending.iter().map(|m| (m.manifest.uuid, m)).collect();
        let mut built = HashMap::new();
        for loaded in &pending {
            resolve_definition(
                loaded.manifest.uuid,
                &manifests,
                &registry,
                &mut built,
                &mut HashSet::new(),
            )?;
        }

        for loaded in &pending {
            let manifest = &loaded.manifest;
            let implementation = self
                .implementations
                .get(&manifest.implementation)
                .cloned()
                .ok_or_else(|| LayerStackError::UnknownImplementation {
                    layer: manifest.name.clone(),
                    implementation: manifest.implementation.clone(),
                })?;
            let definition = built
                .remove(&manifest.uuid)
                .ok_or_else(|| LayerStackError::UnknownBase {
                    layer: manifest.name.clone(),
                    base: manifest.uuid,
                })?;
            registry.insert(definition, implementation)?;
        }

        tracing::info!(
            layers = registry.len(),
            libraries = self.libraries.len(),
            "Layer registry built"
        );
        Ok(registry)
    }
}

fn scan_libraries<M>(libraries: &[PathBuf], registry: &LayerRegistry<M>) -> StackResult<Vec<LoadedManifest>>
where
    M: Send + Sync + 'static,
{
    let mut seen: HashSet<Uuid> = registry.layers.keys().copied().collect();
    let mut pending = Vec::new();
    for library in libraries {
        if !library.is_dir() {
            tracing::warn!(
                library = %library.display(),
                "Layer library does not exist, trying the next one"
            );
            continue;
        }
        let mut dirs: Vec<PathBuf> = fs::read_dir(library)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();
        for dir in dirs {
            if find_declaration(&dir).is_none() {
                tracing::debug!(dir = %dir.display(), "No layer declaration, skipping");
                continue;
            }
            let loaded = LayerManifest::load(&dir)?;
            if !seen.insert(loaded.manifest.uuid) {
                tracing::warn!(
                    layer = %loaded.manifest.name,
                    uuid = %loaded.manifest.uuid,
                    dir = %dir.display(),
                    "Layer already provided by an earlier library, ignoring this copy"
                );
                continue;
            }
            pending.push(loaded);
        }
    }
    Ok(pending)
}

fn resolve_definition<M>(
    uuid: Uuid,
    manifests: &HashMap<Uuid, &LoadedManifest>,
    registry: &LayerRegistry<M>,
    built: &mut HashMap<Uuid, LayerDefinition>,
    visiting: &mut HashSet<Uuid>,
) -> StackResult<LayerDefinition>
where
    M: Send + Sync + 'static,
{
    if let Some(definition) = built.get(&uuid) {
        return Ok(definition.clone());
    }
    if !visiting.insert(uuid) {
        return Err(LayerStackError::InheritanceCycle(uuid));
    }
    let loaded = manifests[&uuid];
    let base = match loaded.manifest.extends {
        Some(base) if manifests.contains_key(&base) => Some(resolve_definition(
            base, manifests, registry, built, visiting,
        )?),
        Some(base) => match registry.get(&base) {
            Some(layer) => Some(layer.definition().as_ref().clone()),
            None => {
                return Err(LayerStackError::UnknownBase {
                    layer: loaded.manifest.name.clone(),
                    base,
                })
            }
        },
        None => None,
    };
    let definition = loaded
        .manifest
        .to_definition(base.as_ref())?
        .with_source(loaded.source.clone());
    visiting.remove(&uuid);
    built.insert(uuid, definition.clone());
    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{ArgDescriptor, BoundArgs};
    use crate::error::LayerResult;
    use crate::layer::executor::{LayerContext, ModelFreeLayer};
    use async_trait::async_trait;
    use serde_json::Value;

    struct Noop;

    #[async_trait]
    impl ModelFreeLayer for Noop {
        async fn apply(&self, _ctx: &LayerContext, _args: &BoundArgs) -> LayerResult<bool> {
            Ok(true)
        }
    }

    fn write_layer(lib: &Path, dir: &str, body: &str) {
        let path = lib.join(dir);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("layer.yaml"), body).unwrap();
    }

    fn noop_builder() -> LayerRegistryBuilder<Value> {
        LayerRegistry::builder().implementation("noop", LayerImpl::model_free(Noop))
    }

    #[test]
    fn test_programmatic_registration_and_lookup() {
        let def = LayerDefinition::builder("Noop", Uuid::new_v4(), "0.1.0")
            .arg(ArgDescriptor::positional("x"))
            .build()
            .unwrap();
        let uuid = def.uuid();
        let registry = LayerRegistry::<Value>::builder()
            .layer(def, LayerImpl::model_free(Noop))
            .build()
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&uuid));
        assert!(registry.find("Noop", "0.1.0").is_some());
        assert!(registry.find("Noop", "0.2.0").is_none());
    }

    #[test]
    fn test_duplicate_programmatic_uuid() {
        let uuid = Uuid::new_v4();
        let a = LayerDefinition::builder("A", uuid, "0.1.0").build().unwrap();
        let b = LayerDefinition::builder("B", uuid, "0.2.0").build().unwrap();
        let result = LayerRegistry::<Value>::builder()
            .layer(a, LayerImpl::model_free(Noop))
            .layer(b, LayerImpl::model_free(Noop))
            .build();
        assert!(matches!(result, Err(LayerStackError::DuplicateLayer(u)) if u == uuid));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let def = LayerDefinition::builder("M", Uuid::new_v4(), "0.1.0")
            .model_layer()
            .build()
            .unwrap();
        let result = LayerRegistry::<Value>::builder()
            .layer(def, LayerImpl::model_free(Noop))
            .build();
        assert!(matches!(result, Err(LayerStackError::InvalidDeclaration { .. })));
    }

    #[test]
    fn test_scan_library_with_extends() {
        let lib = tempfile::tempdir().unwrap();
        let base = Uuid::new_v4();
        let derived = Uuid::new_v4();
        // Directory order puts the derived layer first.
        write_layer(
            lib.path(),
            "a_derived",
            &format!(
                "name: Derived\nuuid: {derived}\nversion: 0.1.0\nimplementation: noop\nextends: {base}\nargs:\n  - name: extra\n"
            ),
        );
        write_layer(
            lib.path(),
            "b_base",
            &format!(
                "name: Base\nuuid: {base}\nversion: 0.1.0\nimplementation: noop\nargs:\n  - name: first\n"
            ),
        );
        fs::create_dir_all(lib.path().join("not_a_layer")).unwrap();

        let registry = noop_builder().library(lib.path()).build().unwrap();
        assert_eq!(registry.len(), 2);
        let def = registry.definition(&derived).unwrap();
        let names: Vec<_> = def.args().iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["first", "extra"]);
        assert_eq!(def.base(), Some(base));
        assert!(def.checksum().is_some());
        assert!(def.source().unwrap().dir.ends_with("a_derived"));
    }

    #[test]
    fn test_earlier_library_wins_and_missing_library_is_skipped() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let uuid = Uuid::new_v4();
        write_layer(
            first.path(),
            "layer",
            &format!("name: First\nuuid: {uuid}\nversion: 0.2.0\nimplementation: noop\n"),
        );
        write_layer(
            second.path(),
            "layer",
            &format!("name: Second\nuuid: {uuid}\nversion: 0.1.0\nimplementation: noop\n"),
        );
        let registry = noop_builder()
            .library(first.path().join("does-not-exist"))
            .libraries([first.path(), second.path()])
            .build()
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&uuid).unwrap().name(), "First");
    }

    #[test]
    fn test_unknown_implementation() {
        let lib = tempfile::tempdir().unwrap();
        write_layer(
            lib.path(),
            "x",
            &format!("name: X\nuuid: {}\nimplementation: missing\n", Uuid::new_v4()),
        );
        let err = noop_builder().library(lib.path()).build().err().unwrap();
        assert!(matches!(err, LayerStackError::UnknownImplementation { .. }));
    }

    #[test]
    fn test_inheritance_cycle() {
        let lib = tempfile::tempdir().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        write_layer(
            lib.path(),
            "a",
            &format!("name: A\nuuid: {a}\nimplementation: noop\nextends: {b}\n"),
        );
        write_layer(
            lib.path(),
            "b",
            &format!("name: B\nuuid: {b}\nimplementation: noop\nextends: {a}\n"),
        );
        let err = noop_builder().library(lib.path()).build().err().unwrap();
        assert!(matches!(err, LayerStackError::InheritanceCycle(_)));
    }

    #[test]
    fn test_find_latest() {
        let a = LayerDefinition::builder("Same", Uuid::new_v4(), "0.9.0").build().unwrap();
        let b = LayerDefinition::builder("Same", Uuid::new_v4(), "0.10.0").build().unwrap();
        let registry = LayerRegistry::<Value>::builder()
            .layer(a, LayerImpl::model_free(Noop))
            .layer(b, LayerImpl::model_free(Noop))
            .build()
            .unwrap();
        assert_eq!(registry.find_latest("Same").unwrap().version(), "0.10.0");
    }
}
