//! Layer declaration files found in layer libraries.
//!
//! Each layer directory holds one `layer.yaml` (or `.yml` / `.json` /
//! `.toml`) declaring the layer's identity and argument contract, and naming
//! the `apply` implementation registered for it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::definition::{LayerDefinition, LayerKind, LayerSource};
use crate::args::{ArgAction, ArgDescriptor, Multiplicity, ValueParser};
use crate::codec::checksum::sha256_hex;
use crate::codec::DocumentFormat;
use crate::error::{LayerStackError, StackResult};

/// Candidate declaration file names, in lookup order.
pub const DECLARATION_FILES: [&str; 4] = ["layer.yaml", "layer.yml", "layer.json", "layer.toml"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerManifest {
    pub name: String,
    pub uuid: Uuid,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, alias = "desc")]
    pub description: Option<String>,
    #[serde(default)]
    pub kind: LayerKind,
    pub implementation: String,
    #[serde(default)]
    pub extends: Option<Uuid>,
    #[serde(default)]
    pub args: Vec<ArgDecl>,
    /// Keyword declarations in declaration order.
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgDecl {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parser: ValueParser,
    #[serde(default)]
    pub choices: Option<Vec<Value>>,
    #[serde(default, alias = "nargs")]
    pub multiplicity: Multiplicity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KwargDecl {
    #[serde(default)]
    pub default: Value,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parser: ValueParser,
    #[serde(default)]
    pub choices: Option<Vec<Value>>,
    #[serde(default, alias = "nargs")]
    pub multiplicity: Multiplicity,
    #[serde(default)]
    pub action: ArgAction,
}

/// A parsed declaration plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub manifest: LayerManifest,
    pub source: LayerSource,
}

/// Find the declaration file inside a layer directory.
pub fn find_declaration(layer_dir: &Path) -> Option<PathBuf> {
    DECLARATION_FILES
        .iter()
        .map(|name| layer_dir.join(name))
        .find(|path| path.is_file())
}

impl LayerManifest {
    /// Read the declaration in `layer_dir`.
    pub fn load(layer_dir: &Path) -> StackResult<LoadedManifest> {
        let declaration =
            find_declaration(layer_dir).ok_or_else(|| LayerStackError::InvalidDeclaration {
                source_name: layer_dir.display().to_string(),
                reason: format!("no declaration file (expected one of {:?})", DECLARATION_FILES),
            })?;
        let bytes = fs::read(&declaration)?;
        let content = String::from_utf8_lossy(&bytes);
        let format = DocumentFormat::from_path(&declaration).unwrap_or(DocumentFormat::Yaml);
        let manifest: LayerManifest =
            format
                .parse(&content)
                .map_err(|e| LayerStackError::InvalidDeclaration {
                    source_name: declaration.display().to_string(),
                    reason: e.to_string(),
                })?;
        Ok(LoadedManifest {
            manifest,
            source: LayerSource {
                dir: layer_dir.to_path_buf(),
                declaration,
                checksum: sha256_hex(&bytes),
            },
        })
    }

    /// Build the definition, flattening in `base` when the manifest extends one.
    pub fn to_definition(&self, base: Option<&LayerDefinition>) -> StackResult<LayerDefinition> {
        let mut builder = LayerDefinition::builder(&self.name, self.uuid, &self.version)
            .kind(self.kind);
        if let Some(description) = &self.description {
            builder = builder.description(description);
        }
        if let Some(base) = base {
            builder = builder.extends(base);
        }
        for decl in &self.args {
            let mut arg = ArgDescriptor::positional(&decl.name)
                .description(&decl.description)
                .parser(decl.parser)
                .multiplicity(decl.multiplicity);
            if let Some(choices) = &decl.choices {
                arg = arg.choices(choices.iter().cloned());
            }
            builder = builder.arg(arg);
        }
        for (name, raw) in &self.kwargs {
            let decl: KwargDecl = serde_json::from_value(raw.clone()).map_err(|e| {
                LayerStackError::InvalidDeclaration {
                    source_name: self.name.clone(),
                    reason: format!("keyword '{}': {}", name, e),
                }
            })?;
            let mut kwarg = ArgDescriptor::keyword(name, decl.default)
                .description(decl.description)
                .parser(decl.parser)
                .multiplicity(decl.multiplicity)
                .action(decl.action);
            if let Some(choices) = decl.choices {
                kwarg = kwarg.choices(choices);
            }
            builder = builder.kwarg(kwarg);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const YAML: &str = r#"
name: Scale Loads
uuid: 2f3c9a4e-7a43-4a47-9f0f-3d5c1c2b9e11
version: 0.2.0
kind: model
implementation: json-scale
args:
  - name: pointer
    parser: string
kwargs:
  multiplier:
    default: 2.0
    parser: float
  mode:
    default: linear
    choices: [linear, quadratic]
  tags:
    default: []
    nargs: "*"
    action: append
"#;

    #[test]
    fn test_load_yaml_declaration() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("layer.yaml"), YAML).unwrap();

        let loaded = LayerManifest::load(dir.path()).unwrap();
        assert_eq!(loaded.manifest.name, "Scale Loads");
        assert_eq!(loaded.manifest.kind, LayerKind::Model);
        assert_eq!(loaded.source.checksum.len(), 64);

        let def = loaded.manifest.to_definition(None).unwrap();
        assert!(def.is_model_layer());
        assert_eq!(def.args()[0].get_parser(), ValueParser::String);
        let names: Vec<_> = def.kwargs().iter().map(|k| k.name()).collect();
        assert_eq!(names, vec!["multiplier", "mode", "tags"]);
        let tags = def.kwarg("tags").unwrap();
        assert_eq!(tags.get_action(), ArgAction::Append);
        assert_eq!(tags.get_multiplicity(), Multiplicity::ZeroOrMore);
        assert_eq!(def.kwarg("multiplier").unwrap().default_value(), Some(&json!(2.0)));
    }

    #[test]
    fn test_load_toml_declaration() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("layer.toml"),
            r#"
name = "Log"
uuid = "8d1f7d7e-9b0e-4c52-8c55-1f0c5b7b5a10"
implementation = "log-message"

[[args]]
name = "message"

[kwargs.zeta]
default = "last"

[kwargs.alpha]
default = 1
parser = "int"
"#,
        )
        .unwrap();
        let loaded = LayerManifest::load(dir.path()).unwrap();
        assert_eq!(loaded.manifest.version, "0.1.0");
        assert_eq!(loaded.manifest.kind, LayerKind::ModelFree);
        assert!(loaded.source.declaration.ends_with("layer.toml"));

        // Keywords keep declaration order, not alphabetical order.
        let def = loaded.manifest.to_definition(None).unwrap();
        let names: Vec<_> = def.kwargs().iter().map(|k| k.name()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_missing_declaration() {
        let dir = tempfile::tempdir().unwrap();
        let err = LayerManifest::load(dir.path()).unwrap_err();
        assert!(matches!(err, LayerStackError::InvalidDeclaration { .. }));
    }

    #[test]
    fn test_bad_keyword_declaration() {
        let manifest: LayerManifest = serde_json::from_value(json!({
            "name": "L",
            "uuid": Uuid::new_v4(),
            "implementation": "x",
            "kwargs": {"k": {"parser": "nonsense"}}
        }))
        .unwrap();
        let err = manifest.to_definition(None).unwrap_err();
        assert!(err.to_string().contains("keyword 'k'"));
    }
}
