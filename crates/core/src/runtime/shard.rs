//! Serialized per-asset event application.
//!
//! Events are routed by a hash of their AssetId to one of N FIFO workers, so
//! every change to one asset is applied in arrival order while unrelated
//! assets proceed in parallel.

use assetkeep_api::{AssetId, AssetRecord};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Notify, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;
use xxhash_rust::xxh3::xxh3_64;

use crate::cache::ObjectCache;
use crate::fileops::ChangeSink;
use crate::index::PathIndex;
use crate::usage::UsageGraph;
use crate::watch::{ChangeKind, WatchEvent, is_relevant_path};

enum ShardMsg {
    Apply(AssetId, WatchEvent),
    Flush(oneshot::Sender<()>),
}

/// Count of spawned rescans that have not finished yet.
#[derive(Default)]
pub(crate) struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn enter(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn exit(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Clone)]
pub(crate) struct ShardContext {
    pub(crate) index: Arc<PathIndex>,
    pub(crate) cache: ObjectCache,
    pub(crate) graph: Arc<UsageGraph>,
    pub(crate) rescans: Arc<InFlight>,
}

#[derive(Clone)]
pub(crate) struct EventRouter {
    index: Arc<PathIndex>,
    shards: Arc<Vec<mpsc::UnboundedSender<ShardMsg>>>,
    routed: Arc<AtomicU64>,
}

impl EventRouter {
    /// Spawn `count` shard workers. Must be called inside a Tokio runtime.
    pub(crate) fn spawn(ctx: ShardContext, count: usize, cancel: CancellationToken) -> Self {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..count.max(1))
            .map(|_| mpsc::unbounded_channel::<ShardMsg>())
            .unzip();
        let router = Self {
            index: ctx.index.clone(),
            shards: Arc::new(senders),
            routed: Arc::new(AtomicU64::new(0)),
        };
        for (shard, rx) in receivers.into_iter().enumerate() {
            tokio::spawn(run_shard(shard, ctx.clone(), router.clone(), rx, cancel.clone()));
        }
        router
    }

    pub(crate) fn route(&self, event: WatchEvent) {
        let id = match self.index.resolve(&event.path) {
            Ok(id) if !id.is_root() => id,
            Ok(_) => return,
            Err(e) => {
                tracing::debug!("Ignoring event outside the asset root: {}", e);
                return;
            }
        };
        let shard = (xxh3_64(id.as_str().as_bytes()) % self.shards.len() as u64) as usize;
        self.routed.fetch_add(1, Ordering::AcqRel);
        if self.shards[shard].send(ShardMsg::Apply(id, event)).is_err() {
            tracing::debug!("Shard {} is shut down, dropping event", shard);
        }
    }

    /// Wait until every event routed so far has been applied, including
    /// the events that applying them routed in turn.
    pub(crate) async fn flush(&self) {
        loop {
            let before = self.routed.load(Ordering::Acquire);
            let mut pending = Vec::with_capacity(self.shards.len());
            for shard in self.shards.iter() {
                let (tx, rx) = oneshot::channel();
                if shard.send(ShardMsg::Flush(tx)).is_ok() {
                    pending.push(rx);
                }
            }
            if pending.is_empty() {
                return;
            }
            for rx in pending {
                let _ = rx.await;
            }
            if self.routed.load(Ordering::Acquire) == before {
                return;
            }
        }
    }
}

impl ChangeSink for EventRouter {
    fn push(&self, event: WatchEvent) {
        self.route(event);
    }
}

async fn run_shard(
    shard: usize,
    ctx: ShardContext,
    router: EventRouter,
    mut rx: mpsc::UnboundedReceiver<ShardMsg>,
    cancel: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        match msg {
            ShardMsg::Apply(id, event) => apply_event(&ctx, &router, id, event).await,
            ShardMsg::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Event shard {} stopped", shard);
}

async fn apply_event(ctx: &ShardContext, router: &EventRouter, id: AssetId, event: WatchEvent) {
    match event.kind {
        ChangeKind::Deleted => remove(ctx, &id),
        ChangeKind::Created | ChangeKind::Modified => match tokio::fs::metadata(&event.path).await {
            Ok(meta) if meta.is_dir() => {
                ctx.index.upsert_folder(&id);
                if event.kind == ChangeKind::Created {
                    register_tree(router, event.path).await;
                }
            }
            Ok(meta) => {
                let modified = meta.modified().ok();
                // Repeated create for a file we already hold unchanged.
                let known = event.kind == ChangeKind::Created
                    && ctx.index.contains(&id)
                    && modified.is_some()
                    && ctx.index.modified(&id) == modified;
                if !known {
                    upsert_file(ctx, id, modified);
                }
            }
            // Gone again before we got to it.
            Err(_) => remove(ctx, &id),
        },
    }
}

fn remove(ctx: &ShardContext, id: &AssetId) {
    for file in ctx.index.remove(id) {
        ctx.cache.evict(&file);
        ctx.graph.forget(&file);
    }
}

fn upsert_file(ctx: &ShardContext, id: AssetId, modified: Option<std::time::SystemTime>) {
    let record = AssetRecord::new(id.clone(), ctx.index.materialize(&id)).with_modified(modified);
    ctx.index.upsert(record);
    ctx.cache.invalidate(&id);
    if ctx.graph.tracks(id.kind()) {
        spawn_rescan(ctx, id);
    }
}

/// Issue a rescan now and run it in the background.
fn spawn_rescan(ctx: &ShardContext, id: AssetId) {
    let ticket = ctx.graph.reserve_scan();
    let graph = ctx.graph.clone();
    let rescans = ctx.rescans.clone();
    rescans.enter();
    tokio::spawn(async move {
        let _ = graph.rescan_reserved(ticket, &id).await;
        rescans.exit();
    });
}

/// Announce the entries of a newly created directory. Each one goes through
/// its own shard so it stays ordered with its other events, and subfolders
/// announce their own entries in turn.
async fn register_tree(router: &EventRouter, dir: PathBuf) {
    let walk_root = dir.clone();
    let found = tokio::task::spawn_blocking(move || {
        WalkDir::new(&walk_root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_entry(|e| {
                e.path()
                    .strip_prefix(&walk_root)
                    .map(is_relevant_path)
                    .unwrap_or(false)
            })
            .filter_map(|e| e.ok())
            .map(|e| WatchEvent::created(e.path(), e.file_type().is_dir()))
            .collect::<Vec<_>>()
    })
    .await;

    match found {
        Ok(found) => found.into_iter().for_each(|event| router.route(event)),
        Err(e) => tracing::warn!("Walking {} failed: {}", dir.display(), e),
    }
}
