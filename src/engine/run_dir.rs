//! The run directory: lock, archive, log file, and checkpoints of one run.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::{LayerStackError, StackResult};
use crate::layer::LogLine;

pub const LOCK_FILE: &str = ".layerstack.lock";
pub const LOG_FILE: &str = "stack.log";
pub const ARCHIVE_FILE: &str = "stack.archive";
pub const CHECKPOINT_DIR: &str = "checkpoints";

/// An open run directory. The lock, when taken, is released on drop.
#[derive(Debug)]
pub struct RunDirectory {
    path: PathBuf,
    locked: bool,
}

impl RunDirectory {
    /// Create `path` if needed and, when `lock` is set, take the run lock.
    pub async fn open(path: impl Into<PathBuf>, lock: bool) -> StackResult<Self> {
        let path = path.into();
        tokio::fs::create_dir_all(&path).await?;
        if lock {
            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path.join(LOCK_FILE))
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    return Err(LayerStackError::RunDirLocked(path));
                }
                Err(e) => return Err(e.into()),
            };
            let owner = format!("pid {} at {}\n", std::process::id(), chrono::Utc::now());
            file.write_all(owner.as_bytes()).await?;
        }
        Ok(Self { path, locked: lock })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn archive_path(&self) -> PathBuf {
        self.path.join(ARCHIVE_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    pub fn checkpoint_dir(&self, index: usize) -> PathBuf {
        self.path.join(CHECKPOINT_DIR).join(format!("{:03}", index))
    }

    /// The highest-indexed checkpoint strictly before binding `before`.
    pub async fn latest_checkpoint(&self, before: usize) -> StackResult<Option<(usize, PathBuf)>> {
        let root = self.path.join(CHECKPOINT_DIR);
        let mut entries = match tokio::fs::read_dir(&root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut latest: Option<(usize, PathBuf)> = None;
        while let Some(entry) = entries.next_entry().await? {
            let Some(index) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<usize>().ok())
            else {
                continue;
            };
            if index < before && latest.as_ref().map_or(true, |(best, _)| index > *best) {
                latest = Some((index, entry.path()));
            }
        }
        Ok(latest)
    }

    /// Append lines to `stack.log`.
    pub async fn append_log(&self, lines: &[LogLine]) -> StackResult<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let mut text = String::new();
        for line in lines {
            text.push_str(&line.to_string());
            text.push('\n');
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

impl Drop for RunDirectory {
    fn drop(&mut self) {
        if self.locked {
            if let Err(e) = std::fs::remove_file(self.path.join(LOCK_FILE)) {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to release run lock");
            }
        }
    }
}
