use async_trait::async_trait;

use crate::error::ApiResult;
use crate::models::{AssetId, BatchId, BatchReport, FileOpTask, SubmittedBatch};

/// Write-side API exposed to UI collaborators.
#[async_trait]
pub trait AssetCommands: Send + Sync {
    /// Validate and start a batch; returns as soon as preflight is done.
    fn submit(&self, batch: Vec<FileOpTask>) -> ApiResult<SubmittedBatch>;

    /// Request cooperative cancellation. Returns false for unknown or finished batches.
    fn cancel(&self, batch: BatchId) -> bool;

    /// Wait for a batch to finish and return its report.
    async fn wait(&self, batch: BatchId) -> ApiResult<BatchReport>;

    fn invalidate(&self, id: &AssetId);
}
