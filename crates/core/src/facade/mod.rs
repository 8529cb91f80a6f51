use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::runtime::AssetEngine;

mod commands;
mod query;

/// Engine handle: the client-facing view of an [`AssetEngine`].
///
/// Implements [`assetkeep_api::AssetQuery`] and
/// [`assetkeep_api::AssetCommands`] for UI collaborators.
#[derive(Clone)]
pub struct EngineHandle {
    pub(crate) engine: Arc<AssetEngine>,
}

impl EngineHandle {
    /// Build an engine with the built-in text assets and scan it.
    pub async fn open(project_root: PathBuf) -> Result<Self> {
        let engine = AssetEngine::builder(project_root).with_text_assets().build()?;
        engine.scan().await?;
        Ok(Self::from_engine(Arc::new(engine)))
    }

    /// Create a handle from an existing engine (useful for testing)
    pub fn from_engine(engine: Arc<AssetEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<AssetEngine> {
        &self.engine
    }
}
