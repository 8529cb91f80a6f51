use std::sync::Arc;

use assetkeep_api::{ApiResult, AssetError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds how many file operations run at once across all batches.
#[derive(Clone)]
pub struct FlowController {
    in_flight: Arc<Semaphore>,
}

impl FlowController {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            in_flight: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    pub async fn acquire_in_flight(&self) -> ApiResult<OwnedSemaphorePermit> {
        self.in_flight
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AssetError::Internal("file-op flow controller closed".to_string()))
    }
}
