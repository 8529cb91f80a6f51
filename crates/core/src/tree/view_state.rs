use assetkeep_api::AssetId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const STATE_DIR: &str = ".assetkeep";
pub const VIEW_STATE_FILE: &str = "view_state.json";

/// Browser state that survives sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewState {
    pub last_directory: Option<AssetId>,
}

impl ViewState {
    pub fn path(project_root: &Path) -> PathBuf {
        project_root.join(STATE_DIR).join(VIEW_STATE_FILE)
    }

    /// Missing or unreadable state falls back to the default.
    pub fn load(project_root: &Path) -> Self {
        let path = Self::path(project_root);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!("Ignoring corrupt view state {}: {}", path.display(), e);
            Self::default()
        })
    }

    pub fn save(&self, project_root: &Path) -> Result<()> {
        let path = Self::path(project_root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}
