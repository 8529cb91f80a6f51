use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::codec::AssetObject;
use crate::error::ApiResult;
use crate::models::{AssetId, Usages};

/// Read-side API exposed to UI collaborators.
#[async_trait]
pub trait AssetQuery: Send + Sync {
    /// Decoded object for a cacheable asset, loading it if needed.
    async fn get(&self, id: &AssetId) -> ApiResult<AssetObject>;

    fn users_of(&self, id: &AssetId) -> BTreeSet<AssetId>;

    fn analyze_usages(&self, id: &AssetId) -> Usages;

    fn can_safely_remove(&self, id: &AssetId) -> bool;

    fn can_safely_move(&self, id: &AssetId) -> bool;

    /// Visible children of a folder, folders first.
    fn list_children(&self, folder: &AssetId) -> ApiResult<Vec<AssetId>>;
}
