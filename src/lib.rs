//! # layerstack: composable, persistable layer pipelines
//!
//! `layerstack` lets you declare reusable units of work ("layers") with a
//! typed argument contract, bind concrete values to them in an ordered
//! "stack", save that stack as a human-readable document, and run it against
//! a shared model:
//!
//! - **Arguments**: positional and keyword descriptors with parsers, choices,
//!   multiplicity, and append/replace actions.
//! - **Layers**: versioned, uuid-identified definitions, optionally extending
//!   a base definition, backed by model-free or model implementations.
//! - **Layer libraries**: directories of `layer.yaml` / `.json` / `.toml`
//!   declarations scanned into a read-only registry.
//! - **Persistence**: YAML, JSON, and TOML stack documents that survive
//!   argument reordering and renaming in later layer versions.
//! - **Execution**: strictly sequential runs with per-layer logging,
//!   model-type checks, checkpoints, resumption, and a run-directory lock.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use layerstack::layer::builtin;
//! use layerstack::{LayerRegistry, Stack, StackRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = builtin::register_layers(LayerRegistry::builder())?
//!         .library("layers")
//!         .build()?;
//!     let loaded = Stack::load("prep.json", &registry)?;
//!     let report = StackRunner::builder(loaded.stack, Arc::new(registry))
//!         .save_path("out/model.json")
//!         .run()
//!         .await?;
//!     println!("{:?}", report.record.state);
//!     Ok(())
//! }
//! ```

pub mod args;
pub mod codec;
pub mod engine;
pub mod error;
pub mod layer;
pub mod stack;

pub use args::{ArgAction, ArgDescriptor, BoundArgs, Multiplicity, ValueParser};
pub use codec::{CodecConfig, DocumentFormat, LoadedStack, ResolutionWarning, StackCodec, VersionPolicy};
pub use engine::{
    BindingOutcome, BindingStatus, EngineConfig, RunFailure, RunRecord, RunReport, RunState,
    StackRunner, StopSignal,
};
pub use error::{
    LayerError, LayerResult, LayerStackError, StackResult, ValidationError, ValidationErrorKind,
};
pub use layer::{
    JsonModelAdapter, LayerContext, LayerDefinition, LayerImpl, LayerKind, LayerRegistry,
    ModelAdapter, ModelFreeLayer, ModelLayer,
};
pub use stack::{LayerBinding, Stack};
