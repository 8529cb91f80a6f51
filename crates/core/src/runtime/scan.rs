use assetkeep_api::{AssetId, AssetRecord};
use futures::StreamExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use super::AssetEngine;
use crate::error::{CoreError, Result};
use crate::watch::is_relevant_path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files: usize,
    pub folders: usize,
    /// Index entries that no longer exist on disk.
    pub removed: usize,
    pub references: usize,
    /// Tracked assets whose references could not be extracted.
    pub unreadable: usize,
}

struct Found {
    path: PathBuf,
    is_dir: bool,
    modified: Option<SystemTime>,
}

impl AssetEngine {
    /// Walk the asset root, bring the index in line with the disk and
    /// rebuild the usage graph.
    pub async fn scan(&self) -> Result<ScanStats> {
        let root = self.index.assets_root().to_path_buf();
        if !root.is_dir() {
            return Err(CoreError::Config(format!(
                "asset root {} is not a directory",
                root.display()
            )));
        }

        let walk_root = root.clone();
        let found = tokio::task::spawn_blocking(move || walk(&walk_root))
            .await
            .map_err(|e| CoreError::Internal(format!("scan task failed: {e}")))?;

        let mut stats = ScanStats::default();
        let mut seen: HashSet<AssetId> = HashSet::new();
        let mut tracked: Vec<AssetId> = Vec::new();

        for entry in found {
            let id = match self.index.resolve(&entry.path) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", entry.path.display(), e);
                    continue;
                }
            };
            if entry.is_dir {
                self.index.upsert_folder(&id);
                stats.folders += 1;
            } else {
                let changed = self.index.modified(&id) != entry.modified || !self.index.contains(&id);
                if changed {
                    let record = AssetRecord::new(id.clone(), self.index.materialize(&id))
                        .with_modified(entry.modified);
                    self.index.upsert(record);
                    self.cache.invalidate(&id);
                }
                if self.graph.tracks(id.kind()) {
                    tracked.push(id.clone());
                }
                stats.files += 1;
            }
            seen.insert(id);
        }

        for stale in self.index.files().into_iter().chain(self.index.folders()) {
            if !seen.contains(&stale) && self.index.exists(&stale) {
                for file in self.index.remove(&stale) {
                    self.cache.evict(&file);
                    self.graph.forget(&file);
                    stats.removed += 1;
                }
            }
        }

        let workers = self.config.decode_workers.max(1);
        let results: Vec<_> = futures::stream::iter(tracked)
            .map(|id| {
                let graph = self.graph.clone();
                async move { graph.rescan(&id).await }
            })
            .buffer_unordered(workers)
            .collect()
            .await;
        for result in results {
            match result {
                Ok(count) => stats.references += count,
                Err(_) => stats.unreadable += 1,
            }
        }

        tracing::info!(
            "Scanned {}: {} file(s), {} folder(s), {} reference(s), {} removed, {} unreadable",
            root.display(),
            stats.files,
            stats.folders,
            stats.references,
            stats.removed,
            stats.unreadable
        );
        Ok(stats)
    }
}

fn walk(root: &Path) -> Vec<Found> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.path()
                .strip_prefix(root)
                .map(is_relevant_path)
                .unwrap_or(false)
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Scan error: {}", e);
                None
            }
        })
        .map(|entry| Found {
            modified: entry.metadata().ok().and_then(|m| m.modified().ok()),
            is_dir: entry.file_type().is_dir(),
            path: entry.into_path(),
        })
        .collect()
}
