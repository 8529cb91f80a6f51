use assetkeep_api::FileOpKind;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::preflight::PlannedOp;
use crate::watch::{PARTIAL_MARKER, WatchEvent};

const COPY_CHUNK: usize = 64 * 1024;

/// A failed operation plus whatever it changed on disk before failing.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ExecError {
    #[source]
    pub error: io::Error,
    pub applied: Vec<WatchEvent>,
}

impl ExecError {
    pub fn partial(error: io::Error, applied: Vec<WatchEvent>) -> Self {
        Self { error, applied }
    }

    pub fn kind(&self) -> io::ErrorKind {
        self.error.kind()
    }
}

impl From<io::Error> for ExecError {
    fn from(error: io::Error) -> Self {
        Self::partial(error, Vec::new())
    }
}

pub type ExecResult = Result<Vec<WatchEvent>, ExecError>;

/// Performs one planned operation on disk.
///
/// Runs on the blocking pool. Returns the changes it made so they can be
/// fed back into the index without waiting for the native watcher. A
/// failure still carries the changes made before it.
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, op: &PlannedOp, cancel: &CancellationToken) -> ExecResult;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsExecutor;

impl TaskExecutor for FsExecutor {
    fn execute(&self, op: &PlannedOp, cancel: &CancellationToken) -> ExecResult {
        match (op.kind, &op.destination) {
            (FileOpKind::Delete, _) => delete(&op.source_path, op.is_dir),
            (FileOpKind::Copy, Some((_, dest))) => copy(&op.source_path, dest, op.is_dir, op.overwrite, cancel),
            (FileOpKind::Move, Some((_, dest))) => relocate(&op.source_path, dest, op.is_dir, op.overwrite, cancel),
            (_, None) => Err(io::Error::new(io::ErrorKind::InvalidInput, "copy and move need a destination").into()),
        }
    }
}

fn cancelled() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "operation cancelled")
}

/// Events that make the index forget a half-removed folder and pick up
/// whatever is still there.
fn resync_folder(path: &Path) -> Vec<WatchEvent> {
    let mut events = vec![WatchEvent::deleted(path, true)];
    if path.exists() {
        events.push(WatchEvent::created(path, true));
    }
    events
}

fn delete(path: &Path, is_dir: bool) -> ExecResult {
    if is_dir {
        if let Err(error) = fs::remove_dir_all(path) {
            return Err(ExecError::partial(error, resync_folder(path)));
        }
    } else {
        fs::remove_file(path)?;
    }
    Ok(vec![WatchEvent::deleted(path, is_dir)])
}

fn clear_destination(dest: &Path) -> ExecResult {
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => match fs::remove_dir_all(dest) {
            Ok(()) => Ok(vec![WatchEvent::deleted(dest, true)]),
            Err(error) => Err(ExecError::partial(error, resync_folder(dest))),
        },
        Ok(_) => {
            fs::remove_file(dest)?;
            Ok(vec![WatchEvent::deleted(dest, false)])
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

fn copy(source: &Path, dest: &Path, is_dir: bool, overwrite: bool, cancel: &CancellationToken) -> ExecResult {
    let existed = dest.exists();
    let mut events = Vec::new();
    if existed && overwrite && (is_dir || dest.is_dir()) {
        events = clear_destination(dest)?;
    }

    if !is_dir {
        if let Err(error) = copy_file(source, dest, cancel) {
            return Err(ExecError::partial(error, events));
        }
        let replaced_file = existed && events.is_empty();
        events.push(if replaced_file {
            WatchEvent::modified(dest)
        } else {
            WatchEvent::created(dest, false)
        });
        return Ok(events);
    }

    match copy_tree(source, dest, cancel, &mut events) {
        Ok(()) => Ok(events),
        Err(error) => Err(ExecError::partial(error, events)),
    }
}

/// Copy a directory tree, recording each entry as it lands.
fn copy_tree(source: &Path, dest: &Path, cancel: &CancellationToken, events: &mut Vec<WatchEvent>) -> io::Result<()> {
    for entry in WalkDir::new(source).sort_by_file_name() {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry.path().strip_prefix(source).map_err(io::Error::other)?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
            events.push(WatchEvent::created(&target, true));
        } else {
            copy_file(entry.path(), &target, cancel)?;
            events.push(WatchEvent::created(&target, false));
        }
    }
    Ok(())
}

fn partial_path(dest: &Path) -> io::Result<PathBuf> {
    let name = dest
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name"))?;
    Ok(dest.with_file_name(format!(".{}{}", name.to_string_lossy(), PARTIAL_MARKER)))
}

/// Copy through a hidden partial file so the destination never holds a
/// half-written asset.
fn copy_file(source: &Path, dest: &Path, cancel: &CancellationToken) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let partial = partial_path(dest)?;
    let result = write_partial(source, &partial, cancel);
    if let Err(e) = result {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }
    if cfg!(windows) && dest.exists() {
        fs::remove_file(dest)?;
    }
    fs::rename(&partial, dest).inspect_err(|_| {
        let _ = fs::remove_file(&partial);
    })
}

fn write_partial(source: &Path, partial: &Path, cancel: &CancellationToken) -> io::Result<()> {
    let mut input = File::open(source)?;
    let mut output = File::create(partial)?;
    let mut buf = vec![0u8; COPY_CHUNK];
    loop {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let read = input.read(&mut buf)?;
        if read == 0 {
            break;
        }
        output.write_all(&buf[..read])?;
    }
    output.sync_all()
}

fn relocate(source: &Path, dest: &Path, is_dir: bool, overwrite: bool, cancel: &CancellationToken) -> ExecResult {
    let mut events = if overwrite { clear_destination(dest)? } else { Vec::new() };
    if let Some(parent) = dest.parent() {
        if let Err(error) = fs::create_dir_all(parent) {
            return Err(ExecError::partial(error, events));
        }
    }

    if fs::rename(source, dest).is_ok() {
        events.push(WatchEvent::deleted(source, is_dir));
        events.push(WatchEvent::created(dest, is_dir));
        return Ok(events);
    }

    // Different filesystems: fall back to copy and delete.
    match copy(source, dest, is_dir, false, cancel) {
        Ok(copied) => events.extend(copied),
        Err(mut failed) => {
            events.append(&mut failed.applied);
            return Err(ExecError::partial(failed.error, events));
        }
    }
    match delete(source, is_dir) {
        Ok(deleted) => {
            events.extend(deleted);
            Ok(events)
        }
        Err(mut failed) => {
            events.append(&mut failed.applied);
            Err(ExecError::partial(failed.error, events))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetkeep_api::AssetId;

    fn op(kind: FileOpKind, source: &Path, dest: Option<&Path>, is_dir: bool) -> PlannedOp {
        let id = AssetId::parse("x").unwrap();
        PlannedOp {
            kind,
            source: id.clone(),
            source_path: source.to_path_buf(),
            destination: dest.map(|d| (id.clone(), d.to_path_buf())),
            is_dir,
            overwrite: false,
        }
    }

    #[test]
    fn test_copy_tree_reports_created_entries() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("gfx");
        fs::create_dir_all(src.join("ui")).unwrap();
        fs::write(src.join("ui/button.png"), b"png").unwrap();
        let dest = dir.path().join("copy");

        let events = FsExecutor
            .execute(&op(FileOpKind::Copy, &src, Some(&dest), true), &CancellationToken::new())
            .unwrap();

        assert_eq!(fs::read(dest.join("ui/button.png")).unwrap(), b"png");
        assert_eq!(events.first(), Some(&WatchEvent::created(&dest, true)));
        assert!(events.contains(&WatchEvent::created(dest.join("ui/button.png"), false)));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_tree_copy_reports_entries_already_copied() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("pack");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.png"), b"a").unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.png"), src.join("z.png")).unwrap();
        let dest = dir.path().join("copy");

        let err = FsExecutor
            .execute(&op(FileOpKind::Copy, &src, Some(&dest), true), &CancellationToken::new())
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(dest.join("a.png").exists());
        assert_eq!(
            err.applied,
            vec![
                WatchEvent::created(&dest, true),
                WatchEvent::created(dest.join("a.png"), false),
            ]
        );
    }

    #[test]
    fn test_cancelled_copy_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("hero.png");
        fs::write(&src, vec![7u8; COPY_CHUNK * 2]).unwrap();
        let dest = dir.path().join("out/hero.png");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = FsExecutor
            .execute(&op(FileOpKind::Copy, &src, Some(&dest), false), &cancel)
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(dir.path().join("out")).unwrap().count(), 0);
    }

    #[test]
    fn test_move_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.scene");
        fs::write(&src, b"{}").unwrap();
        let dest = dir.path().join("scene/a.scene");
        let cancel = CancellationToken::new();

        let events = FsExecutor
            .execute(&op(FileOpKind::Move, &src, Some(&dest), false), &cancel)
            .unwrap();
        assert_eq!(
            events,
            vec![WatchEvent::deleted(&src, false), WatchEvent::created(&dest, false)]
        );
        assert!(!src.exists() && dest.exists());

        FsExecutor
            .execute(&op(FileOpKind::Delete, &dest, None, false), &cancel)
            .unwrap();
        assert!(!dest.exists());
    }
}
