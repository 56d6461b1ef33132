//! Crash-safe status snapshots for external monitors
//!
//! Each publish writes the whole document to a temp file in the destination
//! directory, fsyncs it and renames it over the destination, so a reader
//! sees either the previous snapshot or the new one, never a mix.
//!
//! A snapshot whose timestamp is older than [`STALE_AFTER`] means the writer
//! is gone, whatever its state tag says.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::downloader::{ArchiveConfig, RunStatistics};

/// Snapshot age after which the writer is presumed dead
pub const STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Default status file location used by headless runs
pub const DEFAULT_STATUS_FILE: &str = "/tmp/mailbox-archiver-status.json";

/// Status errors
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    /// Filesystem error
    #[error("IO error: {0}")]
    IoError(String),

    /// Document could not be encoded or decoded
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Lifecycle tag of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Configured, nothing fetched yet
    Starting,
    /// Listing or processing
    Running,
    /// Finished without a fatal error
    Complete,
    /// Stopped by a fatal error
    Error,
    /// Stopped by a shutdown request
    Cancelled,
}

impl RunState {
    /// Whether no further snapshots will follow
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Cancelled)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Configuration echoed into each snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSummary {
    /// Search query
    pub query: String,
    /// Output root
    pub output_dir: String,
}

impl From<&ArchiveConfig> for ConfigSummary {
    fn from(config: &ArchiveConfig) -> Self {
        Self {
            query: config.query.clone(),
            output_dir: config.output_dir.display().to_string(),
        }
    }
}

/// Immutable point-in-time view of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Lifecycle tag
    pub status: RunState,
    /// Wall-clock time of the snapshot
    pub timestamp: DateTime<Utc>,
    /// Counters
    pub stats: RunStatistics,
    /// Run configuration
    pub config: ConfigSummary,
}

/// How a monitor should interpret a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Writer published recently and is not finished
    Active,
    /// Writer stopped publishing without reaching a terminal state
    Stale,
    /// Run reached a terminal state
    Finished,
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Stale => "stale",
            Self::Finished => "finished",
        };
        f.write_str(s)
    }
}

impl StatusSnapshot {
    /// Snapshot stamped with the current time
    pub fn new(status: RunState, stats: RunStatistics, config: ConfigSummary) -> Self {
        Self {
            status,
            timestamp: Utc::now(),
            stats,
            config,
        }
    }

    /// Whether the writer should be considered running at `now`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.liveness(now) == Liveness::Active
    }

    /// Classify the snapshot as seen at `now`
    pub fn liveness(&self, now: DateTime<Utc>) -> Liveness {
        if self.status.is_terminal() {
            return Liveness::Finished;
        }
        let age = now.signed_duration_since(self.timestamp);
        match age.to_std() {
            Ok(age) if age > STALE_AFTER => Liveness::Stale,
            _ => Liveness::Active,
        }
    }

    /// One-line summary: `📧 downloaded/total (pct%)`, plus `⚠️N` when errors occurred
    ///
    /// Before the total is known only the downloaded count is shown.
    pub fn summary_line(&self) -> String {
        let stats = &self.stats;
        let mut line = match stats.percentage() {
            Some(pct) => format!(
                "📧 {}/{} ({:.0}%)",
                stats.downloaded_emails, stats.total_emails, pct
            ),
            None => format!("📧 {}", stats.downloaded_emails),
        };
        if stats.errors > 0 {
            line.push_str(&format!(" ⚠️{}", stats.errors));
        }
        line
    }
}

/// Publishes snapshots to a status file
#[derive(Debug, Clone)]
pub struct StatusReporter {
    path: PathBuf,
}

impl StatusReporter {
    /// Reporter writing to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Destination file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replace the status file with `snapshot`
    pub fn publish(&self, snapshot: &StatusSnapshot) -> Result<(), StatusError> {
        debug!(path = %self.path.display(), status = %snapshot.status, "Publishing status");

        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| StatusError::SerializationError(e.to_string()))?;

        let parent_dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent_dir).map_err(|e| {
            StatusError::IoError(format!("Failed to create {}: {e}", parent_dir.display()))
        })?;

        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| StatusError::IoError(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| StatusError::IoError(format!("Failed to write temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| StatusError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| StatusError::IoError(format!("Failed to sync temp file: {e}")))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| StatusError::IoError(format!("Failed to persist temp file: {e}")))?;

        // Best effort: make the rename itself durable.
        if let Ok(dir) = std::fs::File::open(parent_dir) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    /// Read the current snapshot, if the file exists
    pub fn load(&self) -> Result<Option<StatusSnapshot>, StatusError> {
        load_snapshot(&self.path)
    }
}

/// Read a snapshot from `path`; `Ok(None)` when the file does not exist
pub fn load_snapshot(path: &Path) -> Result<Option<StatusSnapshot>, StatusError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StatusError::IoError(format!(
                "Failed to read {}: {e}",
                path.display()
            )))
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StatusError::SerializationError(e.to_string()))
}
