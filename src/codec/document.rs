//! Serialized shape of a stack document.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::stack::DEFAULT_STACK_VERSION;

/// Top-level stack document. Scalar fields come first so TOML output keeps
/// its tables at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackDocument {
    pub name: String,
    pub uuid: Uuid,
    #[serde(default = "default_stack_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<PathBuf>,
    /// SHA-256 of the document without this field. Archives only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default)]
    pub layers: Vec<BindingDocument>,
}

fn default_stack_version() -> String {
    DEFAULT_STACK_VERSION.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingDocument {
    pub name: String,
    pub uuid: Uuid,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Positional values past the declared arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<Value>,
    #[serde(default)]
    pub args: Vec<ArgValueDocument>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    /// Values bound under names the layer did not declare when saved.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub unknown: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

/// A positional value with the name it was saved under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgValueDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}
