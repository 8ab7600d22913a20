//! The model adapter boundary: the only contract the engine needs from
//! model-specific code.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{LayerError, LayerResult};

/// Capabilities the engine needs to treat a model family uniformly.
#[async_trait]
pub trait ModelAdapter<M>: Send + Sync
where
    M: Send + Sync + 'static,
{
    /// Accept or reject a candidate model before a model layer runs.
    fn check_model_type(&self, model: &M) -> bool;

    /// Materialize a model from `path`.
    async fn load_model(&self, path: &Path) -> LayerResult<M>;

    /// Persist `model` into `path`.
    async fn save_model(&self, model: &M, path: &Path) -> LayerResult<()>;
}

/// Adapter for JSON documents stored as `model.json`.
///
/// `path` may name the JSON file itself or a directory holding `model.json`.
#[derive(Debug, Clone, Default)]
pub struct JsonModelAdapter {
    required_fields: Vec<String>,
}

pub const JSON_MODEL_FILE: &str = "model.json";

impl JsonModelAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept objects carrying `field`.
    pub fn require_field(mut self, field: impl Into<String>) -> Self {
        self.required_fields.push(field.into());
        self
    }

    fn file_for(path: &Path) -> PathBuf {
        if path.extension().map_or(false, |ext| ext == "json") {
            path.to_path_buf()
        } else {
            path.join(JSON_MODEL_FILE)
        }
    }
}

#[async_trait]
impl ModelAdapter<Value> for JsonModelAdapter {
    fn check_model_type(&self, model: &Value) -> bool {
        match model.as_object() {
            Some(map) => self.required_fields.iter().all(|f| map.contains_key(f)),
            None => false,
        }
    }

    async fn load_model(&self, path: &Path) -> LayerResult<Value> {
        let file = Self::file_for(path);
        let bytes = tokio::fs::read(&file)
            .await
            .map_err(|e| LayerError::ModelIo(format!("{}: {}", file.display(), e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save_model(&self, model: &Value, path: &Path) -> LayerResult<()> {
        let file = Self::file_for(path);
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(model)?;
        tokio::fs::write(&file, bytes)
            .await
            .map_err(|e| LayerError::ModelIo(format!("{}: {}", file.display(), e)))
    }
}
