//! Directed "asset A references asset B" graph.
//!
//! A source's outgoing edges are only ever replaced as a whole, under one
//! write lock. Rescans are sequenced by a ticket taken when the rescan is
//! issued, and a result older than the last applied one for the same source
//! is dropped.

pub mod extract;

pub use extract::{AtlasPageExtractor, ExtractorRegistry, PathReferenceExtractor, TextDecoder};

use assetkeep_api::{ApiResult, AssetId, AssetKind, MoveBlocker, Usages};
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cache::ObjectCache;
use crate::index::PathIndex;

/// Sequence number reserved when a rescan is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScanTicket(u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageStats {
    pub nodes: usize,
    pub edges: usize,
    pub unscanned: usize,
    /// Sources with a recorded rescan ticket.
    pub sequenced: usize,
}

enum ScanOutcome {
    Replace(BTreeSet<AssetId>),
    /// Content could not be read; the previous edges stay.
    Unknown,
    Removed,
}

/// Nodes are keyed by [`PathIndex::equality_key`], so references spelled
/// differently from the indexed file still land on its node.
#[derive(Default)]
struct GraphInner {
    topology: StableDiGraph<AssetId, ()>,
    nodes: HashMap<String, NodeIndex>,
    unscanned: HashSet<AssetId>,
    /// Last applied ticket per indexed source. Dropped with the source.
    applied: HashMap<AssetId, ScanTicket>,
}

impl GraphInner {
    fn node(&mut self, key: String, id: &AssetId) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(&key) {
            return idx;
        }
        let idx = self.topology.add_node(id.clone());
        self.nodes.insert(key, idx);
        idx
    }

    fn neighbors(&self, key: &str, direction: Direction) -> BTreeSet<AssetId> {
        let Some(&idx) = self.nodes.get(key) else {
            return BTreeSet::new();
        };
        self.topology
            .neighbors_directed(idx, direction)
            .filter_map(|n| self.topology.node_weight(n).cloned())
            .collect()
    }

    /// Drop every outgoing edge of `source`, returning the old targets.
    fn clear_outgoing(&mut self, key: &str) -> Vec<NodeIndex> {
        let Some(&idx) = self.nodes.get(key) else {
            return Vec::new();
        };
        let edges: Vec<_> = self
            .topology
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.id(), e.target()))
            .collect();
        edges
            .into_iter()
            .map(|(edge, target)| {
                self.topology.remove_edge(edge);
                target
            })
            .collect()
    }

    fn replace(&mut self, key: String, source: &AssetId, targets: Vec<(String, AssetId)>) -> Vec<NodeIndex> {
        let old = self.clear_outgoing(&key);
        if !targets.is_empty() {
            let from = self.node(key, source);
            // A source is always indexed, so its spelling wins over whatever
            // spelling first created the node.
            if let Some(weight) = self.topology.node_weight_mut(from) {
                *weight = source.clone();
            }
            for (target_key, target) in targets {
                let to = self.node(target_key, &target);
                self.topology.add_edge(from, to, ());
            }
        }
        old
    }

    /// Remove nodes that no longer take part in any edge.
    fn prune(&mut self, candidates: impl IntoIterator<Item = NodeIndex>, key_of: impl Fn(&AssetId) -> String) {
        for idx in candidates {
            let isolated = self.topology.contains_node(idx)
                && self.topology.neighbors_undirected(idx).next().is_none();
            if isolated {
                if let Some(id) = self.topology.remove_node(idx) {
                    self.nodes.remove(&key_of(&id));
                }
            }
        }
    }
}

pub struct UsageGraph {
    inner: RwLock<GraphInner>,
    index: Arc<PathIndex>,
    cache: ObjectCache,
    extractors: ExtractorRegistry,
    analyzable: BTreeSet<AssetKind>,
    next_ticket: AtomicU64,
}

impl UsageGraph {
    pub fn new(
        index: Arc<PathIndex>,
        cache: ObjectCache,
        extractors: ExtractorRegistry,
        analyzable: BTreeSet<AssetKind>,
    ) -> Self {
        Self {
            inner: RwLock::new(GraphInner::default()),
            index,
            cache,
            extractors,
            analyzable,
            next_ticket: AtomicU64::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, GraphInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// True when assets of this kind have their references extracted.
    pub fn tracks(&self, kind: AssetKind) -> bool {
        self.extractors.handles(kind)
    }

    pub fn is_analyzable(&self, kind: AssetKind) -> bool {
        self.analyzable.contains(&kind)
    }

    /// Take the next ticket. Call this at the point the rescan is issued so
    /// that results apply in issue order, not completion order.
    pub fn reserve_scan(&self) -> ScanTicket {
        ScanTicket(self.next_ticket.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Re-extract the references of `id` and replace its outgoing edges.
    ///
    /// Returns the number of references found.
    pub async fn rescan(&self, id: &AssetId) -> ApiResult<usize> {
        let ticket = self.reserve_scan();
        self.rescan_reserved(ticket, id).await
    }

    pub async fn rescan_reserved(&self, ticket: ScanTicket, id: &AssetId) -> ApiResult<usize> {
        let Some(record) = self.index.record(id) else {
            self.apply(ticket, id, ScanOutcome::Removed);
            return Ok(0);
        };
        let Some(extractor) = self.extractors.get(record.kind) else {
            self.apply(ticket, id, ScanOutcome::Replace(BTreeSet::new()));
            return Ok(0);
        };

        match self.cache.get(id).await {
            Ok(object) => {
                let targets: BTreeSet<AssetId> = extractor
                    .extract(id, &object)
                    .iter()
                    .map(|target| self.index.canonical(target))
                    .filter(|target| target != id)
                    .collect();
                let count = targets.len();
                self.apply(ticket, id, ScanOutcome::Replace(targets));
                Ok(count)
            }
            Err(err) => {
                tracing::warn!("Rescan of {} failed, keeping previous references: {}", id, err);
                self.apply(ticket, id, ScanOutcome::Unknown);
                Err(err)
            }
        }
    }

    /// Drop the outgoing edges of a deleted asset. Incoming edges stay, they
    /// are now dangling references held by other assets.
    pub fn forget(&self, id: &AssetId) {
        let ticket = self.reserve_scan();
        self.apply(ticket, id, ScanOutcome::Removed);
    }

    fn apply(&self, ticket: ScanTicket, id: &AssetId, outcome: ScanOutcome) -> bool {
        let key = self.index.equality_key(id);
        let mut inner = self.write();
        if let Some(last) = inner.applied.get(id) {
            if *last > ticket {
                tracing::debug!("Dropping out-of-order rescan of {}", id);
                return false;
            }
        }

        match outcome {
            ScanOutcome::Replace(targets) => {
                if !self.index.contains(id) {
                    tracing::debug!("Dropping rescan of {}, it is no longer indexed", id);
                    return false;
                }
                inner.applied.insert(id.clone(), ticket);
                inner.unscanned.remove(id);
                let targets = targets
                    .into_iter()
                    .map(|target| (self.index.equality_key(&target), target))
                    .collect();
                let mut stale = inner.replace(key.clone(), id, targets);
                stale.extend(inner.nodes.get(&key).copied());
                inner.prune(stale, |node| self.index.equality_key(node));
            }
            ScanOutcome::Unknown => {
                if !self.index.contains(id) {
                    return false;
                }
                inner.applied.insert(id.clone(), ticket);
                inner.unscanned.insert(id.clone());
            }
            ScanOutcome::Removed => {
                inner.applied.remove(id);
                inner.unscanned.remove(id);
                let mut stale = inner.clear_outgoing(&key);
                stale.extend(inner.nodes.get(&key).copied());
                inner.prune(stale, |node| self.index.equality_key(node));
            }
        }
        true
    }

    pub fn users_of(&self, id: &AssetId) -> BTreeSet<AssetId> {
        self.read().neighbors(&self.index.equality_key(id), Direction::Incoming)
    }

    pub fn references_of(&self, id: &AssetId) -> BTreeSet<AssetId> {
        self.read().neighbors(&self.index.equality_key(id), Direction::Outgoing)
    }

    pub fn analyze_usages(&self, id: &AssetId) -> Usages {
        Usages {
            target: id.clone(),
            users: self.users_of(id).into_iter().collect(),
        }
    }

    /// False while any asset outside `id` has unknown references, since one
    /// of them may use it.
    pub fn can_safely_remove(&self, id: &AssetId) -> bool {
        self.is_analyzable(id.kind()) && self.users_of(id).is_empty() && self.unscanned_outside(id).is_empty()
    }

    pub fn can_safely_move(&self, id: &AssetId) -> bool {
        self.check_move(id, None).is_ok()
    }

    /// Why moving `id` (optionally to `destination`) could break references.
    pub fn check_move(&self, id: &AssetId, destination: Option<&AssetId>) -> Result<(), MoveBlocker> {
        if !self.index.contains(id) {
            return Err(MoveBlocker::NotIndexed);
        }
        let kind = id.kind();
        if !self.is_analyzable(kind) {
            return Err(MoveBlocker::NotAnalyzable(kind));
        }

        let inner = self.read();
        let users = inner.neighbors(&self.index.equality_key(id), Direction::Incoming);
        if !users.is_empty() {
            return Err(MoveBlocker::InUse(users.into_iter().collect()));
        }
        if !inner.unscanned.is_empty() {
            let mut unknown: Vec<AssetId> = inner.unscanned.iter().cloned().collect();
            unknown.sort();
            return Err(MoveBlocker::UnscannedUsers(unknown));
        }

        if let Some(destination) = destination {
            let to = destination.kind();
            if to != kind {
                return Err(MoveBlocker::KindChange { from: kind, to });
            }
            let captured = inner.neighbors(&self.index.equality_key(destination), Direction::Incoming);
            if !captured.is_empty() {
                return Err(MoveBlocker::CapturesDanglingReferences(captured.into_iter().collect()));
            }
        }
        Ok(())
    }

    /// Referenced targets that are not in the index.
    pub fn dangling(&self) -> Vec<AssetId> {
        let inner = self.read();
        let mut dangling: Vec<AssetId> = inner
            .topology
            .node_indices()
            .filter(|&idx| {
                inner
                    .topology
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_some()
            })
            .filter_map(|idx| inner.topology.node_weight(idx))
            .filter(|id| !self.index.contains(&self.index.canonical(id)))
            .cloned()
            .collect();
        dangling.sort();
        dangling
    }

    pub fn unscanned(&self) -> Vec<AssetId> {
        let mut unscanned: Vec<AssetId> = self.read().unscanned.iter().cloned().collect();
        unscanned.sort();
        unscanned
    }

    /// Unscanned assets other than `scope` and anything below it.
    pub fn unscanned_outside(&self, scope: &AssetId) -> Vec<AssetId> {
        let mut unscanned: Vec<AssetId> = self
            .read()
            .unscanned
            .iter()
            .filter(|id| *id != scope && !id.is_within(scope))
            .cloned()
            .collect();
        unscanned.sort();
        unscanned
    }

    pub fn stats(&self) -> UsageStats {
        let inner = self.read();
        UsageStats {
            nodes: inner.topology.node_count(),
            edges: inner.topology.edge_count(),
            unscanned: inner.unscanned.len(),
            sequenced: inner.applied.len(),
        }
    }
}
