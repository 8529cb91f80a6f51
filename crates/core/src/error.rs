use assetkeep_api::AssetError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Asset(#[from] AssetError),
}

impl From<CoreError> for AssetError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Asset(inner) => inner,
            CoreError::Io(e) => AssetError::Io(e.to_string()),
            other => AssetError::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
