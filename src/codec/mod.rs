//! Persistence: stack documents in YAML, JSON, or TOML, resolved against a
//! layer registry on load.

pub mod checksum;
pub mod document;
pub mod format;
pub mod stack_codec;

pub use document::{ArgValueDocument, BindingDocument, StackDocument};
pub use format::DocumentFormat;
pub use stack_codec::{CodecConfig, LoadedStack, ResolutionWarning, StackCodec, VersionPolicy};
