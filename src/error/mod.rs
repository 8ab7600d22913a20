//! Error types for the layer stack engine.
//!
//! - [`LayerError`]: raised by a layer's own `apply` implementation or a model adapter.
//! - [`ValidationError`]: a single argument problem found while binding values to a layer.
//! - [`LayerStackError`]: top-level errors for declaring, loading, and running stacks.

pub mod layer_error;
pub mod stack_error;
pub mod validation_error;

pub use layer_error::LayerError;
pub use stack_error::LayerStackError;
pub use validation_error::{ValidationError, ValidationErrorKind};

/// Convenience alias for engine-level results.
pub type StackResult<T> = Result<T, LayerStackError>;
/// Convenience alias for layer-level results.
pub type LayerResult<T> = Result<T, LayerError>;
