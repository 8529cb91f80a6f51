use assetkeep_api::{ApiResult, AssetError, AssetEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use tokio_util::sync::CancellationToken;

use super::{AssetEngine, ScanStats};
use crate::watch::DirectoryWatcher;

pub(super) struct WatchSession {
    cancel: CancellationToken,
    alive: Arc<AtomicBool>,
}

impl WatchSession {
    fn stop(&self) {
        self.cancel.cancel();
        self.alive.store(false, Ordering::Release);
    }
}

impl AssetEngine {
    /// Start watching the asset root, replacing any previous watcher.
    ///
    /// A lost watch is published as `AssetEvent::WatchLost` and stays lost
    /// until `restart_watcher` is called.
    pub fn start_watch(&self) -> ApiResult<()> {
        let mut slot = self.watch.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            previous.stop();
        }

        let cancel = self.cancel_token.child_token();
        let mut stream = DirectoryWatcher::start(self.index.assets_root(), self.config.debounce(), cancel.clone())?;
        let alive = Arc::new(AtomicBool::new(true));

        let router = self.router.clone();
        let bus = self.bus.clone();
        let task_alive = alive.clone();
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(event) => router.route(event),
                    Err(AssetError::WatchLost { root, reason }) => {
                        bus.publish(AssetEvent::WatchLost { root, reason });
                        break;
                    }
                    Err(e) => tracing::warn!("Watcher error: {}", e),
                }
            }
            task_alive.store(false, Ordering::Release);
        });

        *slot = Some(WatchSession { cancel, alive });
        Ok(())
    }

    /// Returns false when no watcher was running.
    pub fn stop_watch(&self) -> bool {
        let session = self.watch.lock().unwrap_or_else(PoisonError::into_inner).take();
        match session {
            Some(session) => {
                session.stop();
                tracing::info!("Stopped watching {}", self.index.assets_root().display());
                true
            }
            None => false,
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|s| s.alive.load(Ordering::Acquire))
    }

    /// Start a fresh watcher and rescan to pick up whatever changed while
    /// no watcher was running.
    pub async fn restart_watcher(&self) -> ApiResult<ScanStats> {
        self.start_watch()?;
        Ok(self.scan().await?)
    }
}
