//! Collaborator-supplied hooks for turning asset bytes into objects and
//! objects into references. The core treats both as opaque.

use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::DecodeError;
use crate::models::AssetId;

/// Shared handle to a decoded asset object.
pub type AssetObject = Arc<dyn Any + Send + Sync>;

pub trait AssetDecoder: Send + Sync {
    fn decode(&self, id: &AssetId, bytes: &[u8]) -> Result<AssetObject, DecodeError>;
}

pub trait ReferenceExtractor: Send + Sync {
    /// Every asset referenced by `object`, the decoded content of `id`.
    fn extract(&self, id: &AssetId, object: &AssetObject) -> BTreeSet<AssetId>;
}
