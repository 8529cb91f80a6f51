use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{ApiResult, AssetError};

/// Project-relative, forward-slash separated asset identifier.
///
/// Ids never carry the absolute project root. The empty id names the asset
/// root folder itself.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(Arc<str>);

impl AssetId {
    /// Parse and normalize a project-relative path.
    ///
    /// Backslashes become forward slashes, empty and `.` segments are dropped.
    /// Absolute paths and `..` segments are rejected.
    pub fn parse(raw: &str) -> ApiResult<Self> {
        let unified = raw.replace('\\', "/");
        if unified.starts_with('/') || has_drive_prefix(&unified) {
            return Err(AssetError::invalid_path(raw, "expected a project-relative path"));
        }

        let mut segments = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(AssetError::invalid_path(raw, "path escapes the asset root"));
                }
                s => segments.push(s),
            }
        }

        Ok(Self(Arc::from(segments.join("/"))))
    }

    pub fn root() -> Self {
        Self(Arc::from(""))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// First path segment, e.g. `atlas` for `atlas/ui/buttons.atlas`.
    pub fn top_level(&self) -> Option<&str> {
        self.segments().next()
    }

    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    pub fn extension(&self) -> Option<&str> {
        let (stem, ext) = self.file_name().rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            None
        } else {
            Some(ext)
        }
    }

    pub fn kind(&self) -> AssetKind {
        self.extension()
            .map(AssetKind::from_extension)
            .unwrap_or(AssetKind::Other)
    }

    pub fn parent(&self) -> Option<AssetId> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(Self(Arc::from(&self.0[..idx]))),
            None => Some(Self::root()),
        }
    }

    pub fn join(&self, name: &str) -> ApiResult<AssetId> {
        if self.is_root() {
            Self::parse(name)
        } else {
            Self::parse(&format!("{}/{}", self.0, name))
        }
    }

    /// True when `self` lies strictly below `folder`.
    pub fn is_within(&self, folder: &AssetId) -> bool {
        if folder.is_root() {
            return !self.is_root();
        }
        self.0.len() > folder.0.len()
            && self.0.starts_with(&*folder.0)
            && self.0.as_bytes()[folder.0.len()] == b'/'
    }

    /// Resolve a reference string found inside this asset's content.
    ///
    /// `./` and `../` forms are relative to the folder containing this asset;
    /// anything else (with or without a leading `/`) is project-relative.
    pub fn resolve_reference(&self, raw: &str) -> ApiResult<AssetId> {
        let unified = raw.trim().replace('\\', "/");
        if let Some(stripped) = unified.strip_prefix('/') {
            return Self::parse(stripped);
        }
        if !(unified.starts_with("./") || unified.starts_with("../")) {
            return Self::parse(&unified);
        }

        let base = self.parent().unwrap_or_else(AssetId::root);
        let mut stack: Vec<String> = base.segments().map(str::to_string).collect();
        for segment in unified.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if stack.pop().is_none() {
                        return Err(AssetError::invalid_path(
                            raw,
                            "reference escapes the asset root",
                        ));
                    }
                }
                s => stack.push(s.to_string()),
            }
        }
        Self::parse(&stack.join("/"))
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let mut chars = path.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    )
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("/")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({:?})", &*self.0)
    }
}

impl FromStr for AssetId {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for AssetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for AssetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        AssetId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Scene,
    Atlas,
    Texture,
    Other,
}

impl AssetKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "scene" => AssetKind::Scene,
            "atlas" => AssetKind::Atlas,
            "png" | "jpg" | "jpeg" => AssetKind::Texture,
            _ => AssetKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Scene => "scene",
            AssetKind::Atlas => "atlas",
            AssetKind::Texture => "texture",
            AssetKind::Other => "other",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the index knows about a single asset file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub id: AssetId,
    pub path: PathBuf,
    pub kind: AssetKind,
    pub modified: Option<SystemTime>,
    /// xxh3 of the file content, filled in lazily on first read.
    pub content_hash: Option<u64>,
}

impl AssetRecord {
    pub fn new(id: AssetId, path: PathBuf) -> Self {
        let kind = id.kind();
        Self {
            id,
            path,
            kind,
            modified: None,
            content_hash: None,
        }
    }

    pub fn with_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.modified = modified;
        self
    }
}
