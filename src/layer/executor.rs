//! Layer implementations: the `apply` side of a layer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::model::ModelAdapter;
use crate::args::BoundArgs;
use crate::error::LayerResult;

/// One captured log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub logger: String,
    pub message: String,
}

impl std::fmt::Display for LogLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}|{}|{}|\n    {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.logger,
            self.message
        )
    }
}

/// Execution context handed to a layer's `apply`.
///
/// Messages logged here go to `tracing` under the binding's logger name and
/// are captured into the run record.
#[derive(Debug, Clone)]
pub struct LayerContext {
    stack_name: String,
    layer_name: String,
    index: usize,
    run_dir: PathBuf,
    logger: String,
    lines: Arc<Mutex<Vec<LogLine>>>,
}

impl LayerContext {
    pub fn new(
        stack_name: impl Into<String>,
        layer_name: impl Into<String>,
        index: usize,
        run_dir: impl Into<PathBuf>,
    ) -> Self {
        let stack_name = stack_name.into();
        let layer_name = layer_name.into();
        let logger = logger_name(&stack_name, &layer_name);
        Self {
            stack_name,
            layer_name,
            index,
            run_dir: run_dir.into(),
            logger,
            lines: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn layer_name(&self) -> &str {
        &self.layer_name
    }

    /// Position of the binding in its stack.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// `"<stack>::<layer>"`, the name this binding logs under.
    pub fn logger_name(&self) -> &str {
        &self.logger
    }

    pub fn log(&self, level: tracing::Level, message: impl Into<String>) {
        let message = message.into();
        match level {
            tracing::Level::TRACE => tracing::trace!(logger = %self.logger, message = %message),
            tracing::Level::DEBUG => tracing::debug!(logger = %self.logger, message = %message),
            tracing::Level::INFO => tracing::info!(logger = %self.logger, message = %message),
            tracing::Level::WARN => tracing::warn!(logger = %self.logger, message = %message),
            tracing::Level::ERROR => tracing::error!(logger = %self.logger, message = %message),
        }
        self.lines.lock().push(LogLine {
            timestamp: Utc::now(),
            level: level.to_string(),
            logger: self.logger.clone(),
            message,
        });
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(tracing::Level::DEBUG, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(tracing::Level::INFO, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(tracing::Level::WARN, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(tracing::Level::ERROR, message);
    }

    /// Drain the captured lines.
    pub fn take_lines(&self) -> Vec<LogLine> {
        std::mem::take(&mut *self.lines.lock())
    }
}

pub fn logger_name(stack_name: &str, layer_name: &str) -> String {
    format!("{}::{}", stack_name, layer_name)
}

/// A layer that ignores the model and reports success or failure.
#[async_trait]
pub trait ModelFreeLayer: Send + Sync {
    async fn apply(&self, ctx: &LayerContext, args: &BoundArgs) -> LayerResult<bool>;
}

/// A layer that works on the model in place, or replaces it.
#[async_trait]
pub trait ModelLayer<M>: Send + Sync
where
    M: Send + Sync + 'static,
{
    /// The adapter that checks, loads, and saves this layer's models.
    fn adapter(&self) -> Arc<dyn ModelAdapter<M>>;

    async fn apply(&self, ctx: &LayerContext, model: &mut M, args: &BoundArgs) -> LayerResult<()>;
}

/// The implementation behind a layer definition.
pub enum LayerImpl<M>
where
    M: Send + Sync + 'static,
{
    ModelFree(Arc<dyn ModelFreeLayer>),
    Model(Arc<dyn ModelLayer<M>>),
}

impl<M> LayerImpl<M>
where
    M: Send + Sync + 'static,
{
    pub fn model_free(layer: impl ModelFreeLayer + 'static) -> Self {
        LayerImpl::ModelFree(Arc::new(layer))
    }

    pub fn model(layer: impl ModelLayer<M> + 'static) -> Self {
        LayerImpl::Model(Arc::new(layer))
    }

    pub fn kind(&self) -> super::LayerKind {
        match self {
            LayerImpl::ModelFree(_) => super::LayerKind::ModelFree,
            LayerImpl::Model(_) => super::LayerKind::Model,
        }
    }

    /// The adapter of a model layer.
    pub fn adapter(&self) -> Option<Arc<dyn ModelAdapter<M>>> {
        match self {
            LayerImpl::ModelFree(_) => None,
            LayerImpl::Model(layer) => Some(layer.adapter()),
        }
    }
}

impl<M> Clone for LayerImpl<M>
where
    M: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        match self {
            LayerImpl::ModelFree(layer) => LayerImpl::ModelFree(Arc::clone(layer)),
            LayerImpl::Model(layer) => LayerImpl::Model(Arc::clone(layer)),
        }
    }
}
