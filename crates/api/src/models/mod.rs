pub mod asset;
pub mod event;
pub mod fileops;
pub mod tree;
pub mod usage;

pub use asset::{AssetId, AssetKind, AssetRecord};
pub use event::AssetEvent;
pub use fileops::{
    BatchId, BatchReport, BatchSummary, ConflictReason, FileOpKind, FileOpTask, SubmittedBatch,
    TaskReport, TaskStatus,
};
pub use tree::{FolderNode, TreeEntry};
pub use usage::{MoveBlocker, Usages};
