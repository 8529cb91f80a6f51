use assetkeep_api::{BatchId, BatchReport};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Running batches plus a bounded archive of finished reports.
pub struct BatchTracker {
    inner: Mutex<BatchTrackerInner>,
    archive_limit: usize,
}

#[derive(Default)]
struct BatchTrackerInner {
    next_batch: u64,
    running: HashMap<BatchId, BatchState>,
    finished: VecDeque<BatchReport>,
}

struct BatchState {
    cancel: CancellationToken,
    waiters: Vec<oneshot::Sender<BatchReport>>,
}

pub enum BatchWaiter {
    Finished(BatchReport),
    Pending(oneshot::Receiver<BatchReport>),
    Unknown,
}

impl BatchTracker {
    pub fn new(archive_limit: usize) -> Self {
        Self {
            inner: Mutex::new(BatchTrackerInner::default()),
            archive_limit: archive_limit.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BatchTrackerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register_batch(&self, cancel: CancellationToken) -> BatchId {
        let mut guard = self.lock();
        guard.next_batch += 1;
        let id = BatchId(guard.next_batch);
        guard.running.insert(
            id,
            BatchState {
                cancel,
                waiters: Vec::new(),
            },
        );
        id
    }

    /// Returns false for unknown or already finished batches.
    pub fn cancel(&self, id: BatchId) -> bool {
        let guard = self.lock();
        match guard.running.get(&id) {
            Some(state) => {
                state.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn finish(&self, report: BatchReport) {
        let mut guard = self.lock();
        if let Some(state) = guard.running.remove(&report.id) {
            for waiter in state.waiters {
                let _ = waiter.send(report.clone());
            }
        }
        guard.finished.push_back(report);
        while guard.finished.len() > self.archive_limit {
            guard.finished.pop_front();
        }
    }

    pub fn waiter(&self, id: BatchId) -> BatchWaiter {
        let mut guard = self.lock();
        if let Some(state) = guard.running.get_mut(&id) {
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            return BatchWaiter::Pending(rx);
        }
        match guard.finished.iter().find(|r| r.id == id) {
            Some(report) => BatchWaiter::Finished(report.clone()),
            None => BatchWaiter::Unknown,
        }
    }

    pub fn report(&self, id: BatchId) -> Option<BatchReport> {
        self.lock().finished.iter().find(|r| r.id == id).cloned()
    }

    pub fn running(&self) -> Vec<BatchId> {
        let mut ids: Vec<BatchId> = self.lock().running.keys().copied().collect();
        ids.sort();
        ids
    }
}
