//! Core types for rangedl
//!
//! Everything that crosses the engine boundary lives here: identifiers,
//! job descriptions, states, progress snapshots and events. All of it is
//! serializable so a presentation shell can receive it over IPC.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a download job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownloadId(Uuid);

impl DownloadId {
    /// Create a new random download ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DownloadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DownloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 8 bytes are plenty to tell jobs apart in logs
        for b in &self.0.as_bytes()[0..8] {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// One download run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadJob {
    /// Unique identifier
    pub id: DownloadId,
    /// Source URL
    pub url: String,
    /// Destination file
    pub dest_path: PathBuf,
    /// Number of segments the caller asked for
    pub segment_count: usize,
    /// Total size in bytes, 0 until probed or when the server omits it
    pub total_size: u64,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Created, controller not yet running
    Idle,
    /// Waiting for the size probe
    Probing,
    /// Workers are transferring
    Downloading,
    /// Workers are suspended
    Paused,
    /// Stop requested, waiting for workers to exit
    Stopping,
    /// All workers exited (fully downloaded or stopped)
    Completed,
    /// A probe or segment error ended the job
    Failed,
}

impl JobState {
    /// Check if the job reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Probing => "probing",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Final status handed back to the caller
#[derive(Debug, Clone)]
pub enum DownloadOutcome {
    /// Every segment was fully written
    Completed,
    /// The job was stopped; the output file is partial
    Stopped,
    /// The job failed; the output file must not be used
    Failed { reason: EngineError },
}

impl DownloadOutcome {
    /// Check for a fully successful download
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// The failure reason, if any
    pub fn error(&self) -> Option<&EngineError> {
        match self {
            Self::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Point-in-time view of a job's progress
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Total size in bytes, `None` while unknown
    pub total_size: Option<u64>,
    /// Sum of bytes written across all segments
    pub bytes_written: u64,
    /// Time since the job started transferring
    pub elapsed: Duration,
    /// Bytes per second since the previous snapshot
    pub throughput: u64,
    /// Estimated time remaining, `None` when it cannot be computed
    pub eta: Option<Duration>,
    /// Number of segment workers currently alive
    pub active_workers: usize,
}

impl ProgressSnapshot {
    /// Progress percentage (0.0 - 100.0), `None` while the size is unknown
    pub fn percentage(&self) -> Option<f64> {
        match self.total_size {
            Some(total) if total > 0 => Some((self.bytes_written as f64 / total as f64) * 100.0),
            _ => None,
        }
    }
}

/// Events emitted by the download engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DownloadEvent {
    /// Job was accepted and its controller spawned
    Started { id: DownloadId },
    /// State changed
    StateChanged {
        id: DownloadId,
        old_state: JobState,
        new_state: JobState,
    },
    /// Progress update
    Progress {
        id: DownloadId,
        progress: ProgressSnapshot,
    },
    /// Job was paused
    Paused { id: DownloadId },
    /// Job was resumed
    Resumed { id: DownloadId },
    /// Download completed successfully
    Completed { id: DownloadId },
    /// Download was stopped before completion
    Stopped { id: DownloadId },
    /// Download failed
    Failed {
        id: DownloadId,
        error: String,
        segment: Option<usize>,
    },
}

impl DownloadEvent {
    /// The job this event belongs to
    pub fn id(&self) -> DownloadId {
        match self {
            Self::Started { id }
            | Self::StateChanged { id, .. }
            | Self::Progress { id, .. }
            | Self::Paused { id }
            | Self::Resumed { id }
            | Self::Completed { id }
            | Self::Stopped { id }
            | Self::Failed { id, .. } => *id,
        }
    }
}
