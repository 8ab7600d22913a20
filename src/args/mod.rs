//! Argument contracts: descriptors, value parsers, and resolved argument sets.

pub mod bound;
pub mod descriptor;
pub mod parser;

pub use bound::BoundArgs;
pub use descriptor::{ArgAction, ArgDescriptor, ArgRole, Multiplicity};
pub use parser::ValueParser;
