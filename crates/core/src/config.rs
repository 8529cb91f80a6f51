use assetkeep_api::AssetKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};

pub const CONFIG_FILE_NAME: &str = "assetkeep.json";
pub const DEBOUNCE_ENV: &str = "ASSETKEEP_DEBOUNCE_MS";

/// Session configuration, loaded once from `<project_root>/assetkeep.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub assets_dir: PathBuf,
    pub debounce_ms: u64,
    pub failure_ttl_ms: u64,
    pub decode_workers: usize,
    pub copy_workers: usize,
    pub event_shards: usize,
    pub event_capacity: usize,
    /// `None` follows the host filesystem.
    pub case_sensitive: Option<bool>,
    pub analyzable_kinds: BTreeSet<AssetKind>,
    pub hidden_texture_roots: Vec<String>,
    pub pinned_folders: Vec<String>,
    pub archived_batches: usize,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("assets"),
            debounce_ms: 200,
            failure_ttl_ms: 5000,
            decode_workers: 4,
            copy_workers: 4,
            event_shards: 4,
            event_capacity: 1024,
            case_sensitive: None,
            analyzable_kinds: [AssetKind::Atlas, AssetKind::Texture].into_iter().collect(),
            hidden_texture_roots: vec!["atlas".to_string(), "bmpfont".to_string()],
            pinned_folders: vec!["gfx".to_string(), "scene".to_string()],
            archived_batches: 32,
        }
    }
}

impl AssetConfig {
    /// Read the project's config file if there is one, then apply env overrides.
    pub fn load(project_root: &Path) -> Result<Self> {
        let path = project_root.join(CONFIG_FILE_NAME);
        let mut config = if path.is_file() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str::<AssetConfig>(&raw)?
        } else {
            AssetConfig::default()
        };

        if let Ok(raw) = std::env::var(DEBOUNCE_ENV) {
            config.debounce_ms = raw.trim().parse().map_err(|_| {
                CoreError::Config(format!("{DEBOUNCE_ENV} must be a number of milliseconds, got {raw:?}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.assets_dir.is_absolute() {
            return Err(CoreError::Config(format!(
                "assets_dir must be relative to the project root, got {}",
                self.assets_dir.display()
            )));
        }
        if self.decode_workers == 0 || self.copy_workers == 0 || self.event_shards == 0 {
            return Err(CoreError::Config(
                "worker and shard counts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn failure_ttl(&self) -> Duration {
        Duration::from_millis(self.failure_ttl_ms)
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
            .unwrap_or(!cfg!(any(target_os = "windows", target_os = "macos")))
    }

    pub fn is_analyzable(&self, kind: AssetKind) -> bool {
        self.analyzable_kinds.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "copy_workers": 1, "analyzable_kinds": ["scene"] }"#,
        )
        .unwrap();

        let config = AssetConfig::load(dir.path()).unwrap();
        assert_eq!(config.copy_workers, 1);
        assert!(config.is_analyzable(AssetKind::Scene));
        assert!(!config.is_analyzable(AssetKind::Atlas));
        assert_eq!(config.decode_workers, 4);
        assert_eq!(config.assets_dir, PathBuf::from("assets"));
    }

    #[test]
    fn test_rejects_zero_workers() {
        let config = AssetConfig {
            decode_workers: 0,
            ..AssetConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
