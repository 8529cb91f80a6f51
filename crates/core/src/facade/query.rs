use super::EngineHandle;
use assetkeep_api::{ApiResult, AssetId, AssetObject, AssetQuery, Usages};
use async_trait::async_trait;
use std::collections::BTreeSet;

#[async_trait]
impl AssetQuery for EngineHandle {
    async fn get(&self, id: &AssetId) -> ApiResult<AssetObject> {
        self.engine.get(id).await
    }

    fn users_of(&self, id: &AssetId) -> BTreeSet<AssetId> {
        self.engine.users_of(id)
    }

    fn analyze_usages(&self, id: &AssetId) -> Usages {
        self.engine.analyze_usages(id)
    }

    fn can_safely_remove(&self, id: &AssetId) -> bool {
        self.engine.can_safely_remove(id)
    }

    fn can_safely_move(&self, id: &AssetId) -> bool {
        self.engine.can_safely_move(id)
    }

    fn list_children(&self, folder: &AssetId) -> ApiResult<Vec<AssetId>> {
        self.engine.list_children(folder)
    }
}
