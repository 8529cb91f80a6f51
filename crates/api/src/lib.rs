pub mod codec;
pub mod commands;
pub mod error;
pub mod models;
pub mod query;

pub use codec::{AssetDecoder, AssetObject, ReferenceExtractor};
pub use commands::AssetCommands;
pub use error::{ApiResult, AssetError, DecodeError};
pub use models::*;
pub use query::AssetQuery;

/// Composite trait for clients that need both halves of the API.
pub trait AssetService: AssetQuery + AssetCommands {}

impl<T: AssetQuery + AssetCommands> AssetService for T {}
