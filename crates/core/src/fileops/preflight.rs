//! Synchronous validation of a batch before anything on disk changes.

use assetkeep_api::{ApiResult, AssetError, AssetId, ConflictReason, FileOpKind, FileOpTask};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::index::PathIndex;
use crate::usage::UsageGraph;

/// A task that passed preflight, with both ends resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOp {
    pub kind: FileOpKind,
    pub source: AssetId,
    pub source_path: PathBuf,
    pub destination: Option<(AssetId, PathBuf)>,
    pub is_dir: bool,
    pub overwrite: bool,
}

pub type Verdict = Result<PlannedOp, ConflictReason>;

/// Resolve and check every task of a batch.
///
/// A path outside the asset root fails the whole batch. Every other problem
/// is a per-task conflict.
pub fn preflight(tasks: &[FileOpTask], index: &PathIndex, graph: &UsageGraph) -> ApiResult<Vec<Verdict>> {
    let mut resolved = Vec::with_capacity(tasks.len());
    for task in tasks {
        let source = index.resolve(&task.source)?;
        if source.is_root() {
            return Err(AssetError::invalid_path(
                task.source.display(),
                "the asset root itself cannot be copied, moved or deleted",
            ));
        }
        let destination = match (task.kind, &task.destination) {
            (FileOpKind::Delete, _) => None,
            (_, Some(dest)) => Some(index.resolve(dest)?),
            (_, None) => {
                return Err(AssetError::invalid_path(
                    task.source.display(),
                    "copy and move need a destination",
                ));
            }
        };
        resolved.push((source, destination));
    }

    let mut claimed: HashSet<AssetId> = HashSet::new();
    let verdicts = tasks
        .iter()
        .zip(resolved)
        .map(|(task, (source, destination))| {
            let verdict = check(task, source, destination, index, graph, &claimed);
            if let Ok(PlannedOp {
                destination: Some((dest, _)),
                ..
            }) = &verdict
            {
                claimed.insert(dest.clone());
            }
            verdict
        })
        .collect();
    Ok(verdicts)
}

fn check(
    task: &FileOpTask,
    source: AssetId,
    destination: Option<AssetId>,
    index: &PathIndex,
    graph: &UsageGraph,
    claimed: &HashSet<AssetId>,
) -> Verdict {
    let source_path = index.materialize(&source);
    if !source_path.exists() {
        return Err(ConflictReason::MissingSource(source));
    }
    let is_dir = source_path.is_dir();

    let destination = match destination {
        None => None,
        Some(dest) => {
            // Pasting onto a folder drops the item inside it.
            let dest = if index.materialize(&dest).is_dir() && dest != source {
                dest.join(source.file_name()).unwrap_or_else(|_| dest.clone())
            } else {
                dest
            };
            if dest == source {
                return Err(ConflictReason::SameLocation(dest));
            }
            if dest.is_within(&source) {
                return Err(ConflictReason::IntoItself(source));
            }
            let dest_path = index.materialize(&dest);
            let occupied = dest_path.exists() || index.exists(&dest);
            if claimed.contains(&dest) || (occupied && !task.overwrite) {
                return Err(ConflictReason::DestinationExists(dest));
            }
            Some((dest, dest_path))
        }
    };

    if !task.force {
        match task.kind {
            FileOpKind::Delete => check_delete(&source, is_dir, index, graph)?,
            FileOpKind::Move => {
                if let Some((dest, _)) = &destination {
                    check_move(&source, dest, is_dir, index, graph)?;
                }
            }
            FileOpKind::Copy => {}
        }
    }

    Ok(PlannedOp {
        kind: task.kind,
        source,
        source_path,
        destination,
        is_dir,
        overwrite: task.overwrite,
    })
}

fn affected_files(source: &AssetId, is_dir: bool, index: &PathIndex) -> Vec<AssetId> {
    if is_dir {
        index.descendants(source)
    } else {
        vec![source.clone()]
    }
}

fn check_delete(source: &AssetId, is_dir: bool, index: &PathIndex, graph: &UsageGraph) -> Result<(), ConflictReason> {
    let files = affected_files(source, is_dir, index);

    // Users that are deleted along with the target do not count.
    for file in &files {
        let users: Vec<AssetId> = graph
            .users_of(file)
            .into_iter()
            .filter(|user| user != source && !user.is_within(source))
            .collect();
        if !users.is_empty() {
            return Err(ConflictReason::InUse {
                target: file.clone(),
                users,
            });
        }
    }
    for file in &files {
        let kind = file.kind();
        if !graph.is_analyzable(kind) {
            return Err(ConflictReason::UsagesUnknown {
                target: file.clone(),
                kind,
            });
        }
    }
    let unscanned = graph.unscanned_outside(source);
    if !unscanned.is_empty() {
        return Err(ConflictReason::UnscannedUsers {
            target: source.clone(),
            unscanned,
        });
    }
    Ok(())
}

fn check_move(
    source: &AssetId,
    dest: &AssetId,
    is_dir: bool,
    index: &PathIndex,
    graph: &UsageGraph,
) -> Result<(), ConflictReason> {
    for file in affected_files(source, is_dir, index) {
        let file_dest = if is_dir {
            relocate(&file, source, dest)
        } else {
            dest.clone()
        };
        graph
            .check_move(&file, Some(&file_dest))
            .map_err(|blocker| ConflictReason::MoveBlocked {
                target: file.clone(),
                blocker,
            })?;
    }
    Ok(())
}

/// Where `file` below `from` ends up when `from` becomes `to`.
pub(crate) fn relocate(file: &AssetId, from: &AssetId, to: &AssetId) -> AssetId {
    let suffix = file
        .as_str()
        .strip_prefix(from.as_str())
        .unwrap_or(file.as_str())
        .trim_start_matches('/');
    to.join(suffix).unwrap_or_else(|_| to.clone())
}
