//! Keyed cache of decoded asset objects.
//!
//! Every slot carries a generation drawn from one cache-wide counter. A
//! load only installs its result if the slot still has the generation the
//! load was started with. `invalidate` bumps it, so a slow load of an old
//! file version can never overwrite a newer one.

pub mod loader;

pub use loader::DecoderRegistry;

use assetkeep_api::{ApiResult, AssetError, AssetEvent, AssetId, AssetObject};
use dashmap::DashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::events::EventBus;
use crate::index::PathIndex;
use loader::AssetLoader;

/// Retries a waiter makes when the load it joined was superseded.
const MAX_STALE_RETRIES: usize = 8;

type LoadFuture = Shared<BoxFuture<'static, ApiResult<AssetObject>>>;

enum SlotState {
    Absent,
    Loading(LoadFuture),
    Ready(AssetObject),
    Failed { error: AssetError, at: Instant },
}

struct Slot {
    generation: u64,
    state: SlotState,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Absent,
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub ready: usize,
    pub decodes: u64,
    /// Loads that finished after being superseded and were thrown away.
    pub discarded: u64,
}

enum Lookup {
    Hit(AssetObject),
    Wait(u64, LoadFuture),
}

struct CacheShared {
    slots: DashMap<AssetId, Slot>,
    generation: AtomicU64,
    loader: AssetLoader,
    permits: Arc<Semaphore>,
    failure_ttl: Duration,
    discarded: AtomicU64,
    shutdown: CancellationToken,
    events: EventBus<AssetEvent>,
}

#[derive(Clone)]
pub struct ObjectCache {
    shared: Arc<CacheShared>,
}

impl ObjectCache {
    pub fn new(
        index: Arc<PathIndex>,
        decoders: DecoderRegistry,
        decode_workers: usize,
        failure_ttl: Duration,
        shutdown: CancellationToken,
        event_capacity: usize,
    ) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                slots: DashMap::new(),
                generation: AtomicU64::new(0),
                loader: AssetLoader::new(index, Arc::new(decoders)),
                permits: Arc::new(Semaphore::new(decode_workers.max(1))),
                failure_ttl,
                discarded: AtomicU64::new(0),
                shutdown,
                events: EventBus::new(event_capacity),
            }),
        }
    }

    pub fn events(&self) -> &EventBus<AssetEvent> {
        &self.shared.events
    }

    pub fn is_cacheable(&self, id: &AssetId) -> bool {
        self.shared.loader.decoders().is_cacheable(id.kind())
    }

    /// Decoded object for `id`.
    ///
    /// Concurrent callers for the same id share one in-flight load. A caller
    /// never receives an object from a load that was superseded while it
    /// waited.
    pub async fn get(&self, id: &AssetId) -> ApiResult<AssetObject> {
        for _ in 0..MAX_STALE_RETRIES {
            match self.lookup(id)? {
                Lookup::Hit(object) => return Ok(object),
                Lookup::Wait(generation, load) => {
                    let result = load.await;
                    if self.generation_of(id) == Some(generation) {
                        return result;
                    }
                    tracing::debug!("Load of {} superseded while waiting, retrying", id);
                }
            }
        }
        Err(AssetError::Internal(format!(
            "{id} was invalidated {MAX_STALE_RETRIES} times while loading"
        )))
    }

    /// Ready object without triggering a load.
    pub fn peek(&self, id: &AssetId) -> Option<AssetObject> {
        self.shared.slots.get(id).and_then(|slot| match &slot.state {
            SlotState::Ready(object) => Some(object.clone()),
            _ => None,
        })
    }

    pub fn invalidate(&self, id: &AssetId) {
        let invalidated = match self.shared.slots.get_mut(id) {
            Some(mut slot) => {
                slot.cancel.cancel();
                slot.generation = self.shared.next_generation();
                slot.state = SlotState::Absent;
                true
            }
            None => false,
        };
        if invalidated {
            self.shared.events.publish(AssetEvent::CacheInvalidated(id.clone()));
        }
    }

    pub fn invalidate_all(&self) {
        let ids: Vec<AssetId> = self.shared.slots.iter().map(|s| s.key().clone()).collect();
        for id in ids {
            self.invalidate(&id);
        }
    }

    /// Drop the slot entirely, used when the asset no longer exists.
    pub fn evict(&self, id: &AssetId) {
        if let Some((_, slot)) = self.shared.slots.remove(id) {
            slot.cancel.cancel();
            self.shared.events.publish(AssetEvent::CacheInvalidated(id.clone()));
        }
    }

    pub fn state(&self, id: &AssetId) -> CacheState {
        match self.shared.slots.get(id).as_deref() {
            None => CacheState::Absent,
            Some(slot) => match slot.state {
                SlotState::Absent => CacheState::Absent,
                SlotState::Loading(_) => CacheState::Loading,
                SlotState::Ready(_) => CacheState::Ready,
                SlotState::Failed { .. } => CacheState::Failed,
            },
        }
    }

    pub fn stats(&self) -> CacheStats {
        let ready = self
            .shared
            .slots
            .iter()
            .filter(|s| matches!(s.state, SlotState::Ready(_)))
            .count();
        CacheStats {
            entries: self.shared.slots.len(),
            ready,
            decodes: self.shared.loader.decode_count(),
            discarded: self.shared.discarded.load(Ordering::Relaxed),
        }
    }

    fn generation_of(&self, id: &AssetId) -> Option<u64> {
        self.shared.slots.get(id).map(|slot| slot.generation)
    }

    fn lookup(&self, id: &AssetId) -> ApiResult<Lookup> {
        let kind = self
            .shared
            .loader
            .index()
            .record(id)
            .map(|r| r.kind)
            .ok_or_else(|| AssetError::NotFound(id.clone()))?;
        if !self.shared.loader.decoders().is_cacheable(kind) {
            return Err(AssetError::NotCacheable {
                id: id.clone(),
                kind,
            });
        }

        let mut slot = self.shared.slots.entry(id.clone()).or_insert_with(|| Slot {
            generation: self.shared.next_generation(),
            state: SlotState::Absent,
            cancel: CancellationToken::new(),
        });

        match &slot.state {
            SlotState::Ready(object) => return Ok(Lookup::Hit(object.clone())),
            SlotState::Loading(load) => return Ok(Lookup::Wait(slot.generation, load.clone())),
            SlotState::Failed { error, at } if at.elapsed() < self.shared.failure_ttl => {
                return Err(error.clone());
            }
            SlotState::Failed { .. } | SlotState::Absent => {}
        }

        let generation = self.shared.next_generation();
        let cancel = self.shared.shutdown.child_token();
        let load = spawn_load(self.shared.clone(), id.clone(), generation, cancel.clone());
        slot.generation = generation;
        slot.cancel = cancel;
        slot.state = SlotState::Loading(load.clone());
        Ok(Lookup::Wait(generation, load))
    }
}

impl CacheShared {
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn install(&self, id: &AssetId, generation: u64, result: &ApiResult<AssetObject>) {
        match self.slots.get_mut(id) {
            Some(mut slot) if slot.generation == generation => {
                slot.state = match result {
                    Ok(object) => SlotState::Ready(object.clone()),
                    Err(AssetError::Cancelled) => SlotState::Absent,
                    Err(error) => {
                        tracing::warn!("Caching failure for {}: {}", id, error);
                        SlotState::Failed {
                            error: error.clone(),
                            at: Instant::now(),
                        }
                    }
                };
            }
            _ => {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Discarding stale load of {} (generation {})", id, generation);
            }
        }
    }
}

fn spawn_load(
    shared: Arc<CacheShared>,
    id: AssetId,
    generation: u64,
    cancel: CancellationToken,
) -> LoadFuture {
    let handle = tokio::spawn(async move {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = shared.permits.clone().acquire_owned() => permit.ok(),
        };

        let result = match permit {
            None => Err(AssetError::Cancelled),
            Some(_permit) => {
                let loader = shared.loader.clone();
                let load_id = id.clone();
                let load_cancel = cancel.clone();
                tokio::task::spawn_blocking(move || loader.load(&load_id, &load_cancel))
                    .await
                    .unwrap_or_else(|e| Err(AssetError::Internal(format!("decode task failed: {e}"))))
            }
        };

        shared.install(&id, generation, &result);
        result
    });

    async move {
        handle
            .await
            .unwrap_or_else(|e| Err(AssetError::Internal(format!("load task failed: {e}"))))
    }
    .boxed()
    .shared()
}
