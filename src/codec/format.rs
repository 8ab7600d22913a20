//! Document formats: YAML, JSON, and TOML text to and from serde types.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{LayerStackError, StackResult};

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFormat {
    /// YAML format (`.yaml` / `.yml`).
    Yaml,
    /// JSON format (`.json`).
    #[default]
    Json,
    /// TOML format (`.toml`).
    Toml,
}

impl DocumentFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(DocumentFormat::Yaml),
            "json" | "archive" => Some(DocumentFormat::Json),
            "toml" => Some(DocumentFormat::Toml),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Yaml => "yaml",
            DocumentFormat::Json => "json",
            DocumentFormat::Toml => "toml",
        }
    }

    /// Parse document text.
    pub fn parse<T: DeserializeOwned>(&self, content: &str) -> StackResult<T> {
        match self {
            DocumentFormat::Yaml => serde_yaml::from_str(content).map_err(codec_error),
            DocumentFormat::Json => serde_json::from_str(content).map_err(codec_error),
            DocumentFormat::Toml => {
                // Go through serde_json::Value so fields typed as Value (raw
                // argument values) keep their natural JSON shape.
                let toml_val: toml::Value = toml::from_str(content).map_err(codec_error)?;
                serde_json::from_value(toml_value_to_json(toml_val)).map_err(codec_error)
            }
        }
    }

    /// Render a document as text.
    pub fn emit<T: Serialize>(&self, document: &T) -> StackResult<String> {
        match self {
            DocumentFormat::Yaml => serde_yaml::to_string(document).map_err(codec_error),
            DocumentFormat::Json => serde_json::to_string_pretty(document).map_err(codec_error),
            DocumentFormat::Toml => toml::to_string_pretty(document).map_err(codec_error),
        }
    }
}

fn codec_error(e: impl std::fmt::Display) -> LayerStackError {
    LayerStackError::Codec(e.to_string())
}

/// TOML has no null, and its datetimes become strings.
fn toml_value_to_json(value: toml::Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        toml::Value::String(s) => Json::String(s),
        toml::Value::Integer(i) => Json::from(i),
        toml::Value::Float(f) => Json::from(f),
        toml::Value::Boolean(b) => Json::Bool(b),
        toml::Value::Datetime(dt) => Json::String(dt.to_string()),
        toml::Value::Array(items) => items.into_iter().map(toml_value_to_json).collect(),
        toml::Value::Table(table) => Json::Object(
            table
                .into_iter()
                .map(|(key, item)| (key, toml_value_to_json(item)))
                .collect(),
        ),
    }
}
