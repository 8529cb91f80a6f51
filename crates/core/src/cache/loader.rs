use assetkeep_api::{ApiResult, AssetDecoder, AssetError, AssetId, AssetKind, AssetObject};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use xxhash_rust::xxh3::xxh3_64;

use crate::index::PathIndex;

/// Decoders keyed by asset kind. A kind is cacheable iff it has one.
#[derive(Default, Clone)]
pub struct DecoderRegistry {
    decoders: HashMap<AssetKind, Arc<dyn AssetDecoder>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: AssetKind, decoder: Arc<dyn AssetDecoder>) {
        self.decoders.insert(kind, decoder);
    }

    pub fn get(&self, kind: AssetKind) -> Option<Arc<dyn AssetDecoder>> {
        self.decoders.get(&kind).cloned()
    }

    pub fn is_cacheable(&self, kind: AssetKind) -> bool {
        self.decoders.contains_key(&kind)
    }
}

/// Blocking read-and-decode path. Runs on the blocking pool only.
#[derive(Clone)]
pub(crate) struct AssetLoader {
    index: Arc<PathIndex>,
    decoders: Arc<DecoderRegistry>,
    decodes: Arc<AtomicU64>,
}

impl AssetLoader {
    pub(crate) fn new(index: Arc<PathIndex>, decoders: Arc<DecoderRegistry>) -> Self {
        Self {
            index,
            decoders,
            decodes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    pub(crate) fn index(&self) -> &PathIndex {
        &self.index
    }

    pub(crate) fn decode_count(&self) -> u64 {
        self.decodes.load(Ordering::Relaxed)
    }

    pub(crate) fn load(&self, id: &AssetId, cancel: &CancellationToken) -> ApiResult<AssetObject> {
        if cancel.is_cancelled() {
            return Err(AssetError::Cancelled);
        }
        let record = self
            .index
            .record(id)
            .ok_or_else(|| AssetError::NotFound(id.clone()))?;
        let decoder = self.decoders.get(record.kind).ok_or_else(|| AssetError::NotCacheable {
            id: id.clone(),
            kind: record.kind,
        })?;

        let bytes = std::fs::read(&record.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AssetError::NotFound(id.clone()),
            _ => AssetError::Io(format!("{}: {}", record.path.display(), e)),
        })?;

        if cancel.is_cancelled() {
            return Err(AssetError::Cancelled);
        }
        self.index.set_content_hash(id, xxh3_64(&bytes));

        self.decodes.fetch_add(1, Ordering::Relaxed);
        decoder
            .decode(id, &bytes)
            .map_err(|source| AssetError::Decode {
                id: id.clone(),
                source,
            })
    }
}
