//! Layers: definitions, implementations, model adapters, and the registry
//! that binds them together.

pub mod builtin;
pub mod definition;
pub mod executor;
pub mod manifest;
pub mod model;
pub mod registry;

pub use definition::{parse_version, LayerDefinition, LayerDefinitionBuilder, LayerKind, LayerSource};
pub use executor::{logger_name, LayerContext, LayerImpl, LogLine, ModelFreeLayer, ModelLayer};
pub use manifest::{LayerManifest, LoadedManifest, DECLARATION_FILES};
pub use model::{JsonModelAdapter, ModelAdapter, JSON_MODEL_FILE};
pub use registry::{LayerRegistry, LayerRegistryBuilder, RegisteredLayer};
