//! Stack-level error types.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use super::{LayerError, ValidationError};

/// Errors raised while declaring layers, building registries, loading stacks,
/// or running them.
#[derive(Debug, Error)]
pub enum LayerStackError {
    #[error("Duplicate argument '{name}' in layer '{layer}': {origin}")]
    DuplicateArgument {
        layer: String,
        name: String,
        origin: String,
    },
    #[error("Invalid layer declaration '{source_name}': {reason}")]
    InvalidDeclaration { source_name: String, reason: String },
    #[error("No implementation registered as '{implementation}' (needed by layer '{layer}')")]
    UnknownImplementation {
        layer: String,
        implementation: String,
    },
    #[error("Layer uuid {0} is registered more than once")]
    DuplicateLayer(Uuid),
    #[error("Base layer {base} of layer '{layer}' not found")]
    UnknownBase { layer: String, base: Uuid },
    #[error("Layer inheritance cycle through {0}")]
    InheritanceCycle(Uuid),
    #[error("Binding index {index} out of range (stack has {len} bindings)")]
    BindingOutOfRange { index: usize, len: usize },
    #[error("Validation failed with {} error(s)", .0.len())]
    Validation(Vec<ValidationError>),
    #[error("Binding {index}: layer '{layer}' rejected the model type")]
    ModelType { index: usize, layer: String },
    #[error("Binding {index}: layer '{layer}' requires a model but none is loaded")]
    ModelNotInitialized { index: usize, layer: String },
    #[error("Unresolved layer {uuid} ('{name}' version {version})")]
    UnresolvedLayer {
        uuid: Uuid,
        name: String,
        version: String,
    },
    #[error("Layer {uuid} was saved at version {saved}, but version {registered} is registered")]
    VersionMismatch {
        uuid: Uuid,
        saved: String,
        registered: String,
    },
    #[error("Binding {index}: layer '{layer}' failed: {source}")]
    LayerApply {
        index: usize,
        layer: String,
        #[source]
        source: LayerError,
    },
    #[error("Run directory {} is already in use by another run", .0.display())]
    RunDirLocked(PathBuf),
    #[error("Stack is not runnable: {0}")]
    NotRunnable(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Stack document error: {0}")]
    Codec(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LayerStackError {
    /// Binding index the error is attached to, if any.
    pub fn binding_index(&self) -> Option<usize> {
        match self {
            LayerStackError::ModelType { index, .. }
            | LayerStackError::ModelNotInitialized { index, .. }
            | LayerStackError::LayerApply { index, .. } => Some(*index),
            LayerStackError::Validation(errors) => errors.iter().find_map(|e| e.binding),
            _ => None,
        }
    }
}
