//! Read-only, lazily materialized folder tree for UI collaborators.

pub mod view_state;

pub use view_state::ViewState;

use assetkeep_api::{ApiResult, AssetError, AssetId, AssetKind, FolderNode, TreeEntry};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::error::Result;
use crate::index::PathIndex;

#[derive(Debug, Clone, Default)]
pub struct TreeRules {
    /// Top-level folders whose texture files are atlas or font pages.
    pub hidden_texture_roots: Vec<String>,
    /// Top-level folders shown even when empty.
    pub pinned_folders: Vec<String>,
}

struct TreeSnapshot {
    version: u64,
    /// Visible entries per folder, already ordered.
    children: HashMap<AssetId, Vec<TreeEntry>>,
}

pub struct AssetTreeView {
    index: Arc<PathIndex>,
    rules: TreeRules,
    project_root: PathBuf,
    snapshot: RwLock<Option<Arc<TreeSnapshot>>>,
    view_state: Mutex<ViewState>,
}

impl AssetTreeView {
    pub fn new(index: Arc<PathIndex>, rules: TreeRules, project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let view_state = ViewState::load(&project_root);
        Self {
            index,
            rules,
            project_root,
            snapshot: RwLock::new(None),
            view_state: Mutex::new(view_state),
        }
    }

    pub fn is_hidden(&self, id: &AssetId, is_folder: bool) -> bool {
        if id.file_name().starts_with('.') {
            return true;
        }
        if is_folder || id.kind() != AssetKind::Texture {
            return false;
        }
        let nested = id.parent().is_some_and(|p| !p.is_root());
        nested
            && id
                .top_level()
                .is_some_and(|top| self.rules.hidden_texture_roots.iter().any(|r| r == top))
    }

    fn snapshot(&self) -> Arc<TreeSnapshot> {
        let version = self.index.version();
        if let Some(current) = self
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|s| s.version == version)
        {
            return current.clone();
        }

        let fresh = Arc::new(self.build(version));
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(fresh.clone());
        fresh
    }

    fn build(&self, version: u64) -> TreeSnapshot {
        let mut children: HashMap<AssetId, Vec<TreeEntry>> = HashMap::new();
        children.insert(AssetId::root(), Vec::new());

        let folders = self.index.folders();
        for folder in &folders {
            children.entry(folder.clone()).or_default();
        }

        let entries = folders
            .into_iter()
            .map(|id| (id, true))
            .chain(self.index.files().into_iter().map(|id| (id, false)));
        for (id, is_folder) in entries {
            if self.is_hidden(&id, is_folder) {
                continue;
            }
            let Some(parent) = id.parent() else { continue };
            children.entry(parent).or_default().push(TreeEntry {
                name: id.file_name().to_string(),
                kind: (!is_folder).then(|| id.kind()),
                id,
                is_folder,
            });
        }

        for list in children.values_mut() {
            list.sort_by(|a, b| {
                b.is_folder
                    .cmp(&a.is_folder)
                    .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                    .then_with(|| a.name.cmp(&b.name))
            });
        }

        TreeSnapshot { version, children }
    }

    /// Visible entries of `folder`: folders first, then files, by name.
    pub fn entries(&self, folder: &AssetId) -> ApiResult<Vec<TreeEntry>> {
        if !self.index.is_folder(folder) {
            return Err(AssetError::NotFound(folder.clone()));
        }
        Ok(self
            .snapshot()
            .children
            .get(folder)
            .cloned()
            .unwrap_or_default())
    }

    pub fn list_children(&self, folder: &AssetId) -> ApiResult<Vec<AssetId>> {
        Ok(self.entries(folder)?.into_iter().map(|e| e.id).collect())
    }

    /// Entries of `folder` whose name contains `needle`, ignoring case.
    pub fn search(&self, folder: &AssetId, needle: &str) -> ApiResult<Vec<TreeEntry>> {
        let needle = needle.to_lowercase();
        Ok(self
            .entries(folder)?
            .into_iter()
            .filter(|e| e.name.to_lowercase().contains(&needle))
            .collect())
    }

    /// Folder hierarchy from the asset root. Empty top-level folders are
    /// left out unless pinned.
    pub fn folder_tree(&self) -> FolderNode {
        let snapshot = self.snapshot();
        let mut root = self.folder_node(&snapshot, AssetId::root());
        root.children.retain(|child| {
            let pinned = self.rules.pinned_folders.iter().any(|p| p == &child.name);
            let has_entries = snapshot
                .children
                .get(&child.id)
                .is_some_and(|entries| !entries.is_empty());
            pinned || has_entries
        });
        root
    }

    fn folder_node(&self, snapshot: &TreeSnapshot, id: AssetId) -> FolderNode {
        let children = snapshot
            .children
            .get(&id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.is_folder)
                    .map(|e| self.folder_node(snapshot, e.id.clone()))
                    .collect()
            })
            .unwrap_or_default();
        FolderNode {
            name: if id.is_root() {
                String::new()
            } else {
                id.file_name().to_string()
            },
            id,
            children,
        }
    }

    pub fn remember_directory(&self, folder: &AssetId) {
        self.view_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_directory = Some(folder.clone());
    }

    /// Last remembered folder, if it still exists.
    pub fn last_directory(&self) -> Option<AssetId> {
        self.view_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_directory
            .clone()
            .filter(|folder| self.index.is_folder(folder))
    }

    pub fn save_view_state(&self) -> Result<()> {
        let state = self
            .view_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        state.save(&self.project_root)
    }
}
