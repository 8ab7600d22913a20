//! Execution engine: drives a stack against a model and records what
//! happened to each binding.

pub mod config;
pub mod record;
pub mod run_dir;
pub mod runner;
pub mod stop;

pub use config::EngineConfig;
pub use record::{format_elapsed, BindingOutcome, BindingStatus, RunRecord, RunState, SkipReason};
pub use run_dir::{RunDirectory, ARCHIVE_FILE, CHECKPOINT_DIR, LOCK_FILE, LOG_FILE};
pub use runner::{RunFailure, RunReport, StackRunner, StackRunnerBuilder};
pub use stop::StopSignal;
