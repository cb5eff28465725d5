//! Types for the run coordinator.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::navigator::NavigatorError;
use crate::progress::ProgressCounters;
use crate::publication::StoreError;
use crate::runlog::{RunLogError, RunMode, RunOutcome, TriggerKind};

/// Coordinator state machine.
///
/// ```text
/// IDLE -> DISCOVERING -> DOWNLOADING -> EXTRACTING -> DONE -> IDLE
///              \              \              \
///               +--------------+--------------+-> FAILED -> IDLE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Discovering,
    Downloading,
    Extracting,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Discovering => "discovering",
            RunState::Downloading => "downloading",
            RunState::Extracting => "extracting",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, RunState::Idle)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort a run or a coordinator operation.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Listing could not be fetched or understood.
    #[error("discovery failed: {0}")]
    Discovery(#[from] NavigatorError),

    #[error("publication store error: {0}")]
    Store(#[from] StoreError),

    #[error("run log error: {0}")]
    RunLog(#[from] RunLogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation requires an idle coordinator.
    #[error("coordinator is busy ({0})")]
    Busy(RunState),
}

/// Why a trigger was not accepted.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("run in progress ({0})")]
    AlreadyRunning(RunState),

    #[error("run worker is not running")]
    WorkerUnavailable,
}

/// A claimed run waiting for the worker.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: String,
    pub trigger: TriggerKind,
    pub mode: RunMode,
}

/// Snapshot of the coordinator for status queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub state: RunState,
    /// Whether the background worker accepts triggers.
    pub worker_running: bool,
    pub run_id: Option<String>,
    pub trigger: Option<TriggerKind>,
    pub mode: Option<RunMode>,
    pub started_at: Option<DateTime<Utc>>,
    pub counters: ProgressCounters,
    pub last_outcome: Option<RunOutcome>,
    pub last_error: Option<String>,
    pub last_finished_at: Option<DateTime<Utc>>,
}

/// What a cleanup removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSummary {
    pub publications_deleted: usize,
    pub run_logs_deleted: usize,
    pub download_dir_removed: bool,
}
