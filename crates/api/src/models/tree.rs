use serde::{Deserialize, Serialize};

use super::asset::{AssetId, AssetKind};

/// One row of a folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub id: AssetId,
    pub name: String,
    pub is_folder: bool,
    pub kind: Option<AssetKind>,
}

/// Folder hierarchy node, as shown in a content tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderNode {
    pub id: AssetId,
    pub name: String,
    pub children: Vec<FolderNode>,
}
