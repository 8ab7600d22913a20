use thiserror::Error;

/// Errors raised while a layer does its own work.
#[derive(Debug, Error)]
pub enum LayerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Execution error: {0}")]
    ExecutionError(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("Argument error: {0}")]
    ArgumentError(String),
    #[error("Model I/O error: {0}")]
    ModelIo(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for LayerError {
    fn from(e: serde_json::Error) -> Self {
        LayerError::SerializationError(e.to_string())
    }
}
