use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::asset::{AssetId, AssetKind};
use super::usage::MoveBlocker;
use crate::error::{ApiResult, AssetError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileOpKind {
    Copy,
    Move,
    Delete,
}

/// One file operation inside a batch.
///
/// Paths may be absolute or relative to the asset root. For copy and move,
/// a destination that is an existing folder receives the source inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOpTask {
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub kind: FileOpKind,
    pub overwrite: bool,
    /// Skip usage-safety checks (the user confirmed an unsafe delete or move).
    /// Never bypasses destination conflicts.
    pub force: bool,
}

impl FileOpTask {
    pub fn copy(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: Some(destination.into()),
            kind: FileOpKind::Copy,
            overwrite: false,
            force: false,
        }
    }

    pub fn relocate(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: Some(destination.into()),
            kind: FileOpKind::Move,
            overwrite: false,
            force: false,
        }
    }

    pub fn delete(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: None,
            kind: FileOpKind::Delete,
            overwrite: false,
            force: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Why preflight refused to run a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ConflictReason {
    #[error("source {0} does not exist")]
    MissingSource(AssetId),
    #[error("destination {0} is the same as the source")]
    SameLocation(AssetId),
    #[error("cannot place {0} inside itself")]
    IntoItself(AssetId),
    #[error("destination {0} already exists")]
    DestinationExists(AssetId),
    #[error("{target} is used by {} asset(s)", users.len())]
    InUse { target: AssetId, users: Vec<AssetId> },
    #[error("usages of {kind} assets cannot be analyzed ({target})")]
    UsagesUnknown { target: AssetId, kind: AssetKind },
    #[error("usages of {target} are unknown while {} asset(s) could not be scanned", unscanned.len())]
    UnscannedUsers {
        target: AssetId,
        unscanned: Vec<AssetId>,
    },
    #[error("move of {target} blocked: {blocker}")]
    MoveBlocked {
        target: AssetId,
        blocker: MoveBlocker,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed(String),
    Cancelled,
    Conflicted(ConflictReason),
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub conflicted: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a TaskStatus>) -> Self {
        let mut summary = BatchSummary::default();
        for status in statuses {
            summary.total += 1;
            match status {
                TaskStatus::Done => summary.succeeded += 1,
                TaskStatus::Failed(_) => summary.failed += 1,
                TaskStatus::Conflicted(_) => summary.conflicted += 1,
                TaskStatus::Cancelled => summary.cancelled += 1,
                TaskStatus::Pending | TaskStatus::Running => {}
            }
        }
        summary
    }

    pub fn into_result(self) -> ApiResult<BatchSummary> {
        if self.failed > 0 {
            Err(AssetError::PartialBatchFailure {
                succeeded: self.succeeded,
                failed: self.failed,
            })
        } else {
            Ok(self)
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} conflicted, {} cancelled (of {})",
            self.succeeded, self.failed, self.conflicted, self.cancelled, self.total
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task: FileOpTask,
    pub status: TaskStatus,
}

/// Final per-task outcome of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub id: BatchId,
    pub summary: BatchSummary,
    pub tasks: Vec<TaskReport>,
}

/// What `submit` hands back: the batch id plus the preflight verdict per task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedBatch {
    pub id: BatchId,
    pub preflight: Vec<TaskStatus>,
}

impl SubmittedBatch {
    pub fn conflicts(&self) -> impl Iterator<Item = (usize, &ConflictReason)> {
        self.preflight
            .iter()
            .enumerate()
            .filter_map(|(idx, status)| match status {
                TaskStatus::Conflicted(reason) => Some((idx, reason)),
                _ => None,
            })
    }
}
