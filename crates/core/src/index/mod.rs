//! Path index: the single place where absolute filesystem paths become
//! [`AssetId`]s and back.
//!
//! Separator and case normalization happen here once. Every other
//! component works purely on ids.

use assetkeep_api::{ApiResult, AssetError, AssetEvent, AssetId, AssetRecord};
use dashmap::{DashMap, DashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::events::EventBus;

pub struct PathIndex {
    assets_root: PathBuf,
    case_sensitive: bool,
    records: DashMap<AssetId, AssetRecord>,
    folders: DashSet<AssetId>,
    /// Folded spelling -> first registered spelling. Only used when the
    /// index is case-insensitive.
    aliases: DashMap<String, AssetId>,
    version: AtomicU64,
    events: EventBus<AssetEvent>,
}

impl PathIndex {
    pub fn new(assets_root: impl Into<PathBuf>, case_sensitive: bool, event_capacity: usize) -> Self {
        let assets_root = assets_root.into();
        let assets_root = std::fs::canonicalize(&assets_root).unwrap_or(assets_root);
        Self {
            assets_root,
            case_sensitive,
            records: DashMap::new(),
            folders: DashSet::new(),
            aliases: DashMap::new(),
            version: AtomicU64::new(0),
            events: EventBus::new(event_capacity),
        }
    }

    pub fn assets_root(&self) -> &Path {
        &self.assets_root
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn events(&self) -> &EventBus<AssetEvent> {
        &self.events
    }

    /// Bumped on every mutation of the index.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Map a filesystem path to its asset id.
    ///
    /// Relative paths are taken relative to the asset root. The path does
    /// not have to exist.
    pub fn resolve(&self, path: &Path) -> ApiResult<AssetId> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.assets_root.join(path)
        };
        let normalized = lexical_normalize(&absolute)
            .ok_or_else(|| AssetError::invalid_path(path.display(), "path escapes the filesystem root"))?;

        let relative = match normalized.strip_prefix(&self.assets_root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => {
                let canonical = canonicalize_existing_prefix(&normalized);
                canonical
                    .strip_prefix(&self.assets_root)
                    .map(Path::to_path_buf)
                    .map_err(|_| AssetError::invalid_path(path.display(), "path is outside the asset root"))?
            }
        };

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => segments.push(
                    part.to_str()
                        .ok_or_else(|| AssetError::invalid_path(path.display(), "path is not valid UTF-8"))?,
                ),
                _ => return Err(AssetError::invalid_path(path.display(), "unexpected path component")),
            }
        }

        let id = AssetId::parse(&segments.join("/"))?;
        Ok(self.canonical(&id))
    }

    pub fn materialize(&self, id: &AssetId) -> PathBuf {
        let mut path = self.assets_root.clone();
        for segment in id.segments() {
            path.push(segment);
        }
        path
    }

    /// Insert or replace a file record. Ancestor folders are registered too.
    pub fn upsert(&self, record: AssetRecord) {
        let id = self.canonical(&record.id);
        if let Some(parent) = id.parent() {
            self.upsert_folder(&parent);
        }
        self.register_alias(&id);

        let record = AssetRecord { id: id.clone(), ..record };
        let previous = self.records.insert(id.clone(), record);
        self.bump();

        match previous {
            Some(_) => self.events.publish(AssetEvent::AssetChanged(id)),
            None => self.events.publish(AssetEvent::AssetCreated(id)),
        }
    }

    pub fn upsert_folder(&self, id: &AssetId) {
        if id.is_root() {
            return;
        }
        let id = self.canonical(id);
        if self.folders.contains(&id) {
            return;
        }
        if let Some(parent) = id.parent() {
            self.upsert_folder(&parent);
        }
        self.register_alias(&id);
        if self.folders.insert(id.clone()) {
            self.bump();
            self.events.publish(AssetEvent::FolderCreated(id));
        }
    }

    /// Remove a file, or a folder with everything below it.
    ///
    /// Returns the ids of the removed files.
    pub fn remove(&self, id: &AssetId) -> Vec<AssetId> {
        let id = self.canonical(id);

        if let Some((removed, _)) = self.records.remove(&id) {
            self.unregister_alias(&removed);
            self.bump();
            self.events.publish(AssetEvent::AssetRemoved(removed.clone()));
            return vec![removed];
        }

        if !self.folders.contains(&id) {
            return Vec::new();
        }

        let mut files: Vec<AssetId> = self
            .records
            .iter()
            .filter(|entry| entry.key().is_within(&id))
            .map(|entry| entry.key().clone())
            .collect();
        files.sort();
        let mut folders: Vec<AssetId> = self
            .folders
            .iter()
            .filter(|folder| folder.is_within(&id))
            .map(|folder| folder.key().clone())
            .collect();
        // Deepest first so listeners see children go before their parents.
        folders.sort_by(|a, b| b.cmp(a));
        folders.push(id.clone());

        for file in &files {
            self.records.remove(file);
            self.unregister_alias(file);
            self.events.publish(AssetEvent::AssetRemoved(file.clone()));
        }
        for folder in folders {
            self.folders.remove(&folder);
            self.unregister_alias(&folder);
            self.events.publish(AssetEvent::FolderRemoved(folder));
        }
        self.bump();
        files
    }

    pub fn record(&self, id: &AssetId) -> Option<AssetRecord> {
        self.records.get(id).map(|r| r.value().clone())
    }

    pub fn contains(&self, id: &AssetId) -> bool {
        self.records.contains_key(id)
    }

    pub fn is_folder(&self, id: &AssetId) -> bool {
        id.is_root() || self.folders.contains(id)
    }

    pub fn exists(&self, id: &AssetId) -> bool {
        self.contains(id) || self.is_folder(id)
    }

    /// Direct children (files and folders) of `folder`, unordered.
    pub fn children(&self, folder: &AssetId) -> Vec<AssetId> {
        let is_child = |id: &AssetId| id.parent().as_ref() == Some(folder);
        let mut children: Vec<AssetId> = self
            .folders
            .iter()
            .filter(|f| is_child(f.key()))
            .map(|f| f.key().clone())
            .collect();
        children.extend(
            self.records
                .iter()
                .filter(|r| is_child(r.key()))
                .map(|r| r.key().clone()),
        );
        children
    }

    /// Every file strictly below `folder`.
    pub fn descendants(&self, folder: &AssetId) -> Vec<AssetId> {
        let mut files: Vec<AssetId> = self
            .records
            .iter()
            .filter(|r| r.key().is_within(folder))
            .map(|r| r.key().clone())
            .collect();
        files.sort();
        files
    }

    pub fn files(&self) -> Vec<AssetId> {
        let mut files: Vec<AssetId> = self.records.iter().map(|r| r.key().clone()).collect();
        files.sort();
        files
    }

    pub fn folders(&self) -> Vec<AssetId> {
        let mut folders: Vec<AssetId> = self.folders.iter().map(|f| f.key().clone()).collect();
        folders.sort();
        folders
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn set_content_hash(&self, id: &AssetId, hash: u64) {
        if let Some(mut record) = self.records.get_mut(id) {
            record.content_hash = Some(hash);
        }
    }

    pub fn content_hash(&self, id: &AssetId) -> Option<u64> {
        self.records.get(id).and_then(|r| r.content_hash)
    }

    pub fn modified(&self, id: &AssetId) -> Option<SystemTime> {
        self.records.get(id).and_then(|r| r.modified)
    }

    fn bump(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Key that is equal for every spelling the index treats as one asset.
    pub fn equality_key(&self, id: &AssetId) -> String {
        if self.case_sensitive {
            id.as_str().to_string()
        } else {
            self.fold(id)
        }
    }

    fn fold(&self, id: &AssetId) -> String {
        id.as_str().to_lowercase()
    }

    fn register_alias(&self, id: &AssetId) {
        if !self.case_sensitive {
            self.aliases.entry(self.fold(id)).or_insert_with(|| id.clone());
        }
    }

    fn unregister_alias(&self, id: &AssetId) {
        if !self.case_sensitive {
            self.aliases.remove_if(&self.fold(id), |_, registered| registered == id);
        }
    }

    /// First-registered spelling of `id`, applied segment by segment so a new
    /// file below a known folder inherits the folder's spelling.
    pub fn canonical(&self, id: &AssetId) -> AssetId {
        if self.case_sensitive || id.is_root() {
            return id.clone();
        }
        if let Some(known) = self.aliases.get(&self.fold(id)) {
            return known.clone();
        }
        match id.parent() {
            Some(parent) if !parent.is_root() => {
                let parent = self.canonical(&parent);
                parent.join(id.file_name()).unwrap_or_else(|_| id.clone())
            }
            _ => id.clone(),
        }
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn lexical_normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

/// Canonicalize the longest existing ancestor and re-attach the rest, so
/// paths to files that no longer exist still map through symlinked roots.
fn canonicalize_existing_prefix(path: &Path) -> PathBuf {
    let mut tail = Vec::new();
    let mut current = path;
    loop {
        if let Ok(canonical) = std::fs::canonicalize(current) {
            let mut out = canonical;
            for part in tail.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                current = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}
