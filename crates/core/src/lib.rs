pub mod error;
pub mod logging;

pub mod cache;
pub mod config;
pub mod events;
pub mod facade;
pub mod fileops;
pub mod index;
pub mod runtime;
pub mod tree;
pub mod usage;
pub mod watch;

pub use config::AssetConfig;
pub use error::Result;
pub use facade::EngineHandle;
pub use runtime::{AssetEngine, AssetEngineBuilder, ScanStats};
