//! Asset engine: explicit wiring of index, cache, graph, file ops and tree.

use assetkeep_api::{
    ApiResult, AssetDecoder, AssetEvent, AssetId, AssetKind, AssetObject, BatchId, BatchReport, FileOpTask,
    FolderNode, MoveBlocker, ReferenceExtractor, SubmittedBatch, TreeEntry, Usages,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::cache::{DecoderRegistry, ObjectCache};
use crate::config::AssetConfig;
use crate::error::{CoreError, Result};
use crate::events::EventBus;
use crate::fileops::{CoordinatorParts, FileOpsCoordinator, FsExecutor, TaskExecutor};
use crate::index::PathIndex;
use crate::tree::{AssetTreeView, TreeRules};
use crate::usage::{AtlasPageExtractor, ExtractorRegistry, PathReferenceExtractor, TextDecoder, UsageGraph};
use crate::watch::WatchEvent;

mod scan;
mod shard;
mod watch;

pub use scan::ScanStats;

use shard::{EventRouter, InFlight, ShardContext};
use watch::WatchSession;

pub struct AssetEngine {
    project_root: PathBuf,
    config: AssetConfig,
    index: Arc<PathIndex>,
    cache: ObjectCache,
    graph: Arc<UsageGraph>,
    fileops: FileOpsCoordinator,
    tree: AssetTreeView,
    router: EventRouter,
    rescans: Arc<InFlight>,
    bus: EventBus<AssetEvent>,
    watch: Mutex<Option<WatchSession>>,
    cancel_token: CancellationToken,
}

pub struct AssetEngineBuilder {
    project_root: PathBuf,
    config: Option<AssetConfig>,
    decoders: DecoderRegistry,
    extractors: ExtractorRegistry,
    executor: Option<Arc<dyn TaskExecutor>>,
}

impl AssetEngineBuilder {
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            project_root,
            config: None,
            decoders: DecoderRegistry::new(),
            extractors: ExtractorRegistry::new(),
            executor: None,
        }
    }

    /// Use this configuration instead of reading `assetkeep.json`.
    pub fn with_config(mut self, config: AssetConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_decoder(mut self, kind: AssetKind, decoder: Arc<dyn AssetDecoder>) -> Self {
        self.decoders.register(kind, decoder);
        self
    }

    pub fn with_reference_extractor(mut self, kind: AssetKind, extractor: Arc<dyn ReferenceExtractor>) -> Self {
        self.extractors.register(kind, extractor);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Text decoding with the built-in extractors: quoted paths for scenes,
    /// page images for atlases.
    pub fn with_text_assets(self) -> Self {
        let text: Arc<dyn AssetDecoder> = Arc::new(TextDecoder);
        self.with_decoder(AssetKind::Scene, text.clone())
            .with_decoder(AssetKind::Atlas, text)
            .with_reference_extractor(AssetKind::Scene, Arc::new(PathReferenceExtractor))
            .with_reference_extractor(AssetKind::Atlas, Arc::new(AtlasPageExtractor))
    }

    /// Wire every component and start the background workers.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<AssetEngine> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(CoreError::Config(
                "the asset engine must be built inside a Tokio runtime".to_string(),
            ));
        }

        let project_root = self
            .project_root
            .canonicalize()
            .unwrap_or_else(|_| self.project_root.clone());
        let config = match self.config {
            Some(config) => {
                config.validate()?;
                config
            }
            None => AssetConfig::load(&project_root)?,
        };

        for kind in [AssetKind::Scene, AssetKind::Atlas, AssetKind::Texture, AssetKind::Other] {
            if self.extractors.handles(kind) && !self.decoders.is_cacheable(kind) {
                tracing::warn!("{} assets have a reference extractor but no decoder; their rescans will fail", kind);
            }
        }

        let cancel_token = CancellationToken::new();
        let capacity = config.event_capacity;
        let index = Arc::new(PathIndex::new(
            project_root.join(&config.assets_dir),
            config.case_sensitive(),
            capacity,
        ));
        let cache = ObjectCache::new(
            index.clone(),
            self.decoders,
            config.decode_workers,
            config.failure_ttl(),
            cancel_token.clone(),
            capacity,
        );
        let graph = Arc::new(UsageGraph::new(
            index.clone(),
            cache.clone(),
            self.extractors,
            config.analyzable_kinds.clone(),
        ));

        let rescans = Arc::new(InFlight::default());
        let router = EventRouter::spawn(
            ShardContext {
                index: index.clone(),
                cache: cache.clone(),
                graph: graph.clone(),
                rescans: rescans.clone(),
            },
            config.event_shards,
            cancel_token.clone(),
        );

        let fileops = FileOpsCoordinator::new(CoordinatorParts {
            index: index.clone(),
            graph: graph.clone(),
            executor: self.executor.unwrap_or_else(|| Arc::new(FsExecutor)),
            workers: config.copy_workers,
            archived_batches: config.archived_batches,
            sink: Arc::new(router.clone()),
            shutdown: cancel_token.clone(),
            event_capacity: capacity,
        });

        let tree = AssetTreeView::new(
            index.clone(),
            TreeRules {
                hidden_texture_roots: config.hidden_texture_roots.clone(),
                pinned_folders: config.pinned_folders.clone(),
            },
            &project_root,
        );

        let bus = EventBus::new(capacity);
        index.events().forward_into(bus.clone(), cancel_token.clone());
        cache.events().forward_into(bus.clone(), cancel_token.clone());
        fileops.events().forward_into(bus.clone(), cancel_token.clone());

        tracing::info!(
            "Asset engine ready for {} ({} shard(s), {} decode worker(s), {} copy worker(s))",
            index.assets_root().display(),
            config.event_shards,
            config.decode_workers,
            config.copy_workers
        );

        Ok(AssetEngine {
            project_root,
            config,
            index,
            cache,
            graph,
            fileops,
            tree,
            router,
            rescans,
            bus,
            watch: Mutex::new(None),
            cancel_token,
        })
    }
}

impl Drop for AssetEngine {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl AssetEngine {
    pub fn builder(project_root: PathBuf) -> AssetEngineBuilder {
        AssetEngineBuilder::new(project_root)
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn assets_root(&self) -> &Path {
        self.index.assets_root()
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<PathIndex> {
        &self.index
    }

    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    pub fn graph(&self) -> &Arc<UsageGraph> {
        &self.graph
    }

    pub fn fileops(&self) -> &FileOpsCoordinator {
        &self.fileops
    }

    pub fn tree(&self) -> &AssetTreeView {
        &self.tree
    }

    /// All outbound events of the engine's components.
    pub fn subscribe(&self) -> broadcast::Receiver<AssetEvent> {
        self.bus.subscribe()
    }

    pub fn resolve(&self, path: &Path) -> ApiResult<AssetId> {
        self.index.resolve(path)
    }

    /// Feed a change into the serialized event path, as the watcher does.
    pub fn ingest(&self, event: WatchEvent) {
        self.router.route(event);
    }

    /// Wait until every ingested event has been applied and every rescan it
    /// issued has finished.
    pub async fn flush(&self) {
        self.router.flush().await;
        self.rescans.wait_idle().await;
    }

    // ---- Cache ----

    pub async fn get(&self, id: &AssetId) -> ApiResult<AssetObject> {
        self.cache.get(id).await
    }

    pub fn invalidate(&self, id: &AssetId) {
        self.cache.invalidate(id);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    // ---- Usages ----

    pub fn users_of(&self, id: &AssetId) -> BTreeSet<AssetId> {
        self.graph.users_of(id)
    }

    pub fn analyze_usages(&self, id: &AssetId) -> Usages {
        self.graph.analyze_usages(id)
    }

    pub fn can_safely_remove(&self, id: &AssetId) -> bool {
        self.graph.can_safely_remove(id)
    }

    pub fn can_safely_move(&self, id: &AssetId) -> bool {
        self.graph.can_safely_move(id)
    }

    pub fn check_move(&self, id: &AssetId, destination: Option<&AssetId>) -> std::result::Result<(), MoveBlocker> {
        self.graph.check_move(id, destination)
    }

    // ---- Tree ----

    pub fn list_children(&self, folder: &AssetId) -> ApiResult<Vec<AssetId>> {
        self.tree.list_children(folder)
    }

    pub fn entries(&self, folder: &AssetId) -> ApiResult<Vec<TreeEntry>> {
        self.tree.entries(folder)
    }

    pub fn search(&self, folder: &AssetId, needle: &str) -> ApiResult<Vec<TreeEntry>> {
        self.tree.search(folder, needle)
    }

    pub fn folder_tree(&self) -> FolderNode {
        self.tree.folder_tree()
    }

    // ---- File operations ----

    pub fn submit(&self, tasks: Vec<FileOpTask>) -> ApiResult<SubmittedBatch> {
        self.fileops.submit(tasks)
    }

    pub fn cancel(&self, batch: BatchId) -> bool {
        self.fileops.cancel(batch)
    }

    pub async fn wait(&self, batch: BatchId) -> ApiResult<BatchReport> {
        self.fileops.wait(batch).await
    }
}
