//! Coalescing of native filesystem notifications.
//!
//! The debouncer keeps at most one pending change per path. A path is
//! released once it has been quiet for the whole window, as a single event
//! describing its terminal state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub is_dir: bool,
}

impl WatchEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            kind,
            path: path.into(),
            is_dir,
        }
    }

    pub fn created(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self::new(ChangeKind::Created, path, is_dir)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Modified, path, false)
    }

    pub fn deleted(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self::new(ChangeKind::Deleted, path, is_dir)
    }
}

#[derive(Debug)]
struct Pending {
    first: ChangeKind,
    last: ChangeKind,
    is_dir: bool,
    last_seen: Instant,
    seq: u64,
}

/// Terminal state of a burst that started with `first` and ended with `last`.
pub fn collapse(first: ChangeKind, last: ChangeKind) -> Option<ChangeKind> {
    use ChangeKind::*;
    match (first, last) {
        (Created, Deleted) => None,
        (Created, _) => Some(Created),
        (Deleted, Deleted) => Some(Deleted),
        (Deleted, _) => Some(Modified),
        (Modified, Deleted) => Some(Deleted),
        (Modified, _) => Some(Modified),
    }
}

pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, Pending>,
    next_seq: u64,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn push(&mut self, event: WatchEvent, now: Instant) {
        match self.pending.get_mut(&event.path) {
            Some(pending) => {
                pending.last = event.kind;
                pending.is_dir |= event.is_dir;
                pending.last_seen = now;
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.pending.insert(
                    event.path,
                    Pending {
                        first: event.kind,
                        last: event.kind,
                        is_dir: event.is_dir,
                        last_seen: now,
                        seq,
                    },
                );
            }
        }
    }

    /// Earliest instant at which some pending path becomes ready.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|p| p.last_seen + self.window)
            .min()
    }

    /// Release every path that has been quiet for the full window, in the
    /// order the paths were first seen.
    pub fn drain_ready(&mut self, now: Instant) -> Vec<WatchEvent> {
        let window = self.window;
        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.last_seen) >= window)
            .map(|(path, _)| path.clone())
            .collect();

        let mut released: Vec<(u64, PathBuf, Pending)> = ready
            .into_iter()
            .filter_map(|path| {
                let pending = self.pending.remove(&path)?;
                Some((pending.seq, path, pending))
            })
            .collect();
        released.sort_by_key(|(seq, _, _)| *seq);
        Self::finish(released)
    }

    /// Release everything regardless of the window.
    pub fn drain_all(&mut self) -> Vec<WatchEvent> {
        let mut released: Vec<(u64, PathBuf, Pending)> = self
            .pending
            .drain()
            .map(|(path, pending)| (pending.seq, path, pending))
            .collect();
        released.sort_by_key(|(seq, _, _)| *seq);
        Self::finish(released)
    }

    fn finish(released: Vec<(u64, PathBuf, Pending)>) -> Vec<WatchEvent> {
        released
            .into_iter()
            .filter_map(|(_, path, pending)| match collapse(pending.first, pending.last) {
                Some(kind) => Some(WatchEvent::new(kind, path, pending.is_dir)),
                None => {
                    tracing::debug!("Create and delete of {} collapsed to nothing", path.display());
                    None
                }
            })
            .collect()
    }
}
