use assetkeep_api::AssetEvent;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

const RESTART_DELAY: Duration = Duration::from_secs(2);

pub async fn run(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Initializing: scanning assets of {}...", path.display());
    let engine = crate::open_engine(path).await?;
    let mut events = engine.subscribe();

    engine.start_watch()?;
    info!("Watching {}. Press Ctrl+C to stop.", engine.assets_root().display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = events.recv() => match received {
                Ok(AssetEvent::WatchLost { root, reason }) => {
                    warn!("Watch on {} lost ({}), restarting", root.display(), reason);
                    tokio::time::sleep(RESTART_DELAY).await;
                    match engine.restart_watcher().await {
                        Ok(stats) => info!("Watcher restarted, {} file(s) indexed", stats.files),
                        Err(e) => warn!("Restart failed: {}", e),
                    }
                }
                Ok(event) => info!("{:?}", event),
                Err(RecvError::Lagged(skipped)) => warn!("{} event(s) skipped", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    }

    engine.stop_watch();
    info!("Watcher stopped.");
    Ok(())
}
