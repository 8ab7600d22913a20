use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Save the model after every successful model-layer binding into
    /// `<run_dir>/checkpoints/<index>`.
    #[serde(default)]
    pub checkpoint: bool,
    /// Write `<run_dir>/stack.archive` before the first binding.
    #[serde(default = "default_true")]
    pub archive: bool,
    /// Append captured log lines to `<run_dir>/stack.log`.
    #[serde(default = "default_true")]
    pub file_log: bool,
    /// Refuse to start while another run holds the run directory.
    #[serde(default = "default_true")]
    pub lock_run_dir: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            checkpoint: false,
            archive: true,
            file_log: true,
            lock_run_dir: true,
        }
    }
}
