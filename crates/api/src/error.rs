use std::fmt;
use std::path::PathBuf;

use crate::models::{AssetId, AssetKind, ConflictReason};

/// Error produced by a collaborator-supplied decoder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DecodeError {
    message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AssetError {
    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("Watch on {} lost: {reason}", root.display())]
    WatchLost { root: PathBuf, reason: String },
    #[error("Failed to decode {id}: {source}")]
    Decode {
        id: AssetId,
        #[source]
        source: DecodeError,
    },
    #[error("Conflict: {0}")]
    Conflict(ConflictReason),
    #[error("Batch finished with {failed} failed task(s), {succeeded} succeeded")]
    PartialBatchFailure { succeeded: usize, failed: usize },
    #[error("Not found: {0}")]
    NotFound(AssetId),
    #[error("Assets of kind {kind} are not cached ({id})")]
    NotCacheable { id: AssetId, kind: AssetKind },
    #[error("Operation cancelled")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AssetError {
    pub fn invalid_path(path: impl fmt::Display, reason: impl Into<String>) -> Self {
        AssetError::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for AssetError {
    fn from(err: std::io::Error) -> Self {
        AssetError::Io(err.to_string())
    }
}

pub type ApiResult<T> = std::result::Result<T, AssetError>;
