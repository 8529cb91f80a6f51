use super::EngineHandle;
use assetkeep_api::{ApiResult, AssetCommands, AssetId, BatchId, BatchReport, FileOpTask, SubmittedBatch};
use async_trait::async_trait;

#[async_trait]
impl AssetCommands for EngineHandle {
    fn submit(&self, batch: Vec<FileOpTask>) -> ApiResult<SubmittedBatch> {
        self.engine.submit(batch)
    }

    fn cancel(&self, batch: BatchId) -> bool {
        self.engine.cancel(batch)
    }

    async fn wait(&self, batch: BatchId) -> ApiResult<BatchReport> {
        self.engine.wait(batch).await
    }

    fn invalidate(&self, id: &AssetId) {
        self.engine.invalidate(id);
    }
}
