//! Run records: what happened to each binding of a run.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::layer::LogLine;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running { index: usize },
    Succeeded,
    Failed { index: usize },
    /// Stopped on request before binding `next` ran.
    Stopped { next: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    /// Before the binding a resumed run started at.
    BeforeStart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BindingStatus {
    Succeeded,
    Failed { error: String },
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingOutcome {
    pub index: usize,
    pub layer: String,
    pub uuid: Uuid,
    pub status: BindingStatus,
    pub elapsed: Duration,
    pub log: Vec<LogLine>,
    /// Checkpoint directory written after this binding.
    pub checkpoint: Option<PathBuf>,
}

impl BindingOutcome {
    pub fn skipped(index: usize, layer: &str, uuid: Uuid, reason: SkipReason) -> Self {
        Self {
            index,
            layer: layer.to_string(),
            uuid,
            status: BindingStatus::Skipped { reason },
            elapsed: Duration::ZERO,
            log: Vec::new(),
            checkpoint: None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, BindingStatus::Skipped { .. })
    }
}

/// Ordered per-binding outcomes of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub stack: String,
    pub stack_uuid: Uuid,
    pub run_dir: PathBuf,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub outcomes: Vec<BindingOutcome>,
}

impl RunRecord {
    pub fn new(stack: &str, stack_uuid: Uuid, run_dir: PathBuf) -> Self {
        Self {
            stack: stack.to_string(),
            stack_uuid,
            run_dir,
            state: RunState::Pending,
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            outcomes: Vec::new(),
        }
    }

    pub fn outcome(&self, index: usize) -> Option<&BindingOutcome> {
        self.outcomes.iter().find(|o| o.index == index)
    }

    pub fn is_success(&self) -> bool {
        self.state == RunState::Succeeded
    }

    /// Latest checkpoint written before binding `before`.
    pub fn last_checkpoint(&self, before: usize) -> Option<&PathBuf> {
        self.outcomes
            .iter()
            .filter(|o| o.index < before)
            .filter_map(|o| o.checkpoint.as_ref())
            .last()
    }
}

/// Human-readable duration: `"1 d 2 h 3 m 4 s"`, `"2 m 3.5 s"`, `"0.25 s"`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64();
    let decimals: u32 = if total >= 3_600.0 {
        0
    } else if total >= 60.0 {
        1
    } else {
        2
    };
    // Round once, then split whole units so no field can round up to 60.
    let scale = 10u64.pow(decimals);
    let units = (total * scale as f64).round() as u64;
    let whole = units / scale;
    let days = whole / 86_400;
    let hours = whole % 86_400 / 3_600;
    let minutes = whole % 3_600 / 60;
    let seconds = (units % (60 * scale)) as f64 / scale as f64;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{} d", days));
    }
    if hours > 0 {
        parts.push(format!("{} h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{} m", minutes));
    }
    let precision = if days > 0 || hours > 0 {
        0
    } else if minutes > 0 {
        1
    } else {
        2
    };
    parts.push(format!("{:.*} s", precision, seconds));
    parts.join(" ")
}
