use serde::{Deserialize, Serialize};

use super::asset::{AssetId, AssetKind};

/// Why a move or rename cannot be done without risking broken references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum MoveBlocker {
    #[error("asset is not indexed")]
    NotIndexed,
    #[error("usages of {0} assets cannot be analyzed")]
    NotAnalyzable(AssetKind),
    #[error("used by {} asset(s) whose references would break", .0.len())]
    InUse(Vec<AssetId>),
    #[error("references of {} asset(s) are unknown", .0.len())]
    UnscannedUsers(Vec<AssetId>),
    #[error("destination changes the asset kind from {from} to {to}")]
    KindChange { from: AssetKind, to: AssetKind },
    #[error("{} asset(s) already reference the destination", .0.len())]
    CapturesDanglingReferences(Vec<AssetId>),
}

/// Result of a "find usages" query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usages {
    pub target: AssetId,
    pub users: Vec<AssetId>,
}

impl Usages {
    pub fn count(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
