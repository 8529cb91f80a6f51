pub mod debounce;

pub use debounce::{ChangeKind, Debouncer, WatchEvent};

use assetkeep_api::{ApiResult, AssetError};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Marker carried by in-progress copy targets; never reported as an asset.
pub const PARTIAL_MARKER: &str = ".assetkeep-partial";

const STREAM_CAPACITY: usize = 256;

/// False for paths the asset subsystem never tracks: anything inside a
/// dot-directory and partially written copy targets.
pub fn is_relevant_path(relative: &Path) -> bool {
    let mut components = relative.components().peekable();
    while let Some(component) = components.next() {
        let name = component.as_os_str().to_string_lossy();
        let is_last = components.peek().is_none();
        if is_last {
            return !name.ends_with(PARTIAL_MARKER);
        }
        if name.starts_with('.') && name != "." && name != ".." {
            return false;
        }
    }
    true
}

struct FsWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl FsWatcher {
    fn new(root: &Path) -> notify::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }
}

/// Debounced change notifications for one root.
///
/// The stream ends after yielding a single `Err(WatchLost)`, or when it is
/// stopped.
pub struct WatchStream {
    root: PathBuf,
    rx: mpsc::Receiver<ApiResult<WatchEvent>>,
    cancel: CancellationToken,
}

impl WatchStream {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn next(&mut self) -> Option<ApiResult<WatchEvent>> {
        self.rx.recv().await
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WatchStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct DirectoryWatcher;

impl DirectoryWatcher {
    /// Start watching `root` recursively. Must be called inside a Tokio runtime.
    pub fn start(root: &Path, window: Duration, cancel: CancellationToken) -> ApiResult<WatchStream> {
        let root = std::fs::canonicalize(root).map_err(|e| AssetError::WatchLost {
            root: root.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut watcher = FsWatcher::new(&root).map_err(|e| AssetError::WatchLost {
            root: root.clone(),
            reason: e.to_string(),
        })?;

        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        let task_root = root.clone();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            let root = task_root;
            tracing::info!("Started watching {}", root.display());
            let mut debouncer = Debouncer::new(window);
            let mut lost: Option<String> = None;

            loop {
                let deadline = debouncer.next_deadline();
                let wake = tokio::time::Instant::from_std(
                    deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600)),
                );

                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    raw = watcher.rx.recv() => match raw {
                        Some(Ok(event)) => {
                            let now = Instant::now();
                            for change in translate(&event) {
                                let relevant = change
                                    .path
                                    .strip_prefix(&root)
                                    .map(is_relevant_path)
                                    .unwrap_or(false);
                                if relevant {
                                    debouncer.push(change, now);
                                }
                            }
                            if !root.is_dir() {
                                lost = Some("watched root no longer exists".to_string());
                            }
                        }
                        Some(Err(err)) => lost = Some(err.to_string()),
                        None => lost = Some("native watcher closed".to_string()),
                    },
                    _ = tokio::time::sleep_until(wake), if deadline.is_some() => {
                        for change in debouncer.drain_ready(Instant::now()) {
                            if tx.send(Ok(change)).await.is_err() {
                                return;
                            }
                        }
                    }
                }

                if let Some(reason) = lost.take() {
                    // Deliver what was already observed before reporting the loss.
                    for change in debouncer.drain_all() {
                        if tx.send(Ok(change)).await.is_err() {
                            return;
                        }
                    }
                    tracing::warn!("Watch on {} lost: {}", root.display(), reason);
                    let _ = tx
                        .send(Err(AssetError::WatchLost {
                            root: root.clone(),
                            reason,
                        }))
                        .await;
                    break;
                }
            }
            tracing::info!("File watcher task ended for {}", root.display());
        });

        Ok(WatchStream { root, rx, cancel })
    }
}

/// Map one native notification to zero or more logical changes.
fn translate(event: &Event) -> Vec<WatchEvent> {
    let paths = &event.paths;
    match &event.kind {
        EventKind::Access(_) => Vec::new(),
        EventKind::Create(kind) => paths
            .iter()
            .map(|p| WatchEvent::created(p, matches!(kind, CreateKind::Folder) || p.is_dir()))
            .collect(),
        EventKind::Remove(kind) => paths
            .iter()
            .map(|p| WatchEvent::deleted(p, matches!(kind, RemoveKind::Folder)))
            .collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => paths.iter().map(|p| WatchEvent::deleted(p, false)).collect(),
            RenameMode::To => paths.iter().map(|p| WatchEvent::created(p, p.is_dir())).collect(),
            RenameMode::Both if paths.len() == 2 => vec![
                WatchEvent::deleted(&paths[0], paths[1].is_dir()),
                WatchEvent::created(&paths[1], paths[1].is_dir()),
            ],
            _ => paths.iter().map(|p| by_existence(p)).collect(),
        },
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => paths
            .iter()
            .filter(|p| !p.is_dir())
            .map(|p| by_existence(p))
            .collect(),
        EventKind::Any | EventKind::Other => paths.iter().map(|p| by_existence(p)).collect(),
    }
}

fn by_existence(path: &Path) -> WatchEvent {
    if path.exists() {
        WatchEvent::new(ChangeKind::Modified, path, path.is_dir())
    } else {
        WatchEvent::deleted(path, false)
    }
}
