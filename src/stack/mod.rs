//! Stacks: ordered, persistable sequences of layer bindings.

pub mod binding;
#[allow(clippy::module_inception)]
pub mod stack;

pub use binding::LayerBinding;
pub use stack::{Stack, DEFAULT_STACK_VERSION};
