//! The on-disk last-task report.
//!
//! The file's presence means a report is waiting to go upstream.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TaskError, TaskResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportEvent {
    Upgrade,
    Rollback,
    Backup,
    /// Any event type this node does not act on.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub event_type: ReportEvent,
    pub success: bool,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub from_version: String,
    #[serde(default)]
    pub to_version: String,
}

#[derive(Debug, Clone)]
pub struct ReportFile {
    path: PathBuf,
}

impl ReportFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// `None` when no report is pending. A present but unreadable
    /// file is an error and is left in place.
    pub fn read(&self) -> TaskResult<Option<TaskReport>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TaskError::Report(format!("{}: {e}", self.path.display()))),
        };
        let report = serde_json::from_str(&content)
            .map_err(|e| TaskError::Report(format!("{}: {e}", self.path.display())))?;
        Ok(Some(report))
    }

    /// Replace the report atomically.
    pub fn write(&self, report: &TaskReport) -> TaskResult<()> {
        let io_err = |e: std::io::Error| TaskError::Report(format!("{}: {e}", self.path.display()));
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let body = serde_json::to_vec_pretty(report).map_err(|e| TaskError::Report(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, body).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        debug!(path = %self.path.display(), event = ?report.event_type, success = report.success, "task report written");
        Ok(())
    }

    /// Remove the report. Missing is fine.
    pub fn remove(&self) -> TaskResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TaskError::Report(format!("{}: {e}", self.path.display()))),
        }
    }
}
