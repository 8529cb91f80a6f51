use std::path::PathBuf;

use super::asset::AssetId;
use super::fileops::{BatchId, BatchSummary};

/// Outbound notification published by the asset subsystems.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetEvent {
    AssetCreated(AssetId),
    AssetChanged(AssetId),
    AssetRemoved(AssetId),
    FolderCreated(AssetId),
    FolderRemoved(AssetId),
    CacheInvalidated(AssetId),
    BatchProgress {
        batch: BatchId,
        completed: usize,
        total: usize,
    },
    BatchFinished {
        batch: BatchId,
        summary: BatchSummary,
    },
    /// The directory watcher stopped; it must be restarted explicitly.
    WatchLost { root: PathBuf, reason: String },
}

impl AssetEvent {
    /// The asset this event is about, if any.
    pub fn asset(&self) -> Option<&AssetId> {
        match self {
            AssetEvent::AssetCreated(id)
            | AssetEvent::AssetChanged(id)
            | AssetEvent::AssetRemoved(id)
            | AssetEvent::FolderCreated(id)
            | AssetEvent::FolderRemoved(id)
            | AssetEvent::CacheInvalidated(id) => Some(id),
            _ => None,
        }
    }
}
