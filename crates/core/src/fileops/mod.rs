//! Batched copy, move and delete with preflight conflict detection.

pub mod exec;
pub mod flow_control;
pub mod preflight;
pub mod tracker;

pub use exec::{ExecError, ExecResult, FsExecutor, TaskExecutor};
pub use flow_control::FlowController;
pub use preflight::{PlannedOp, Verdict};
pub use tracker::{BatchTracker, BatchWaiter};

use assetkeep_api::{
    ApiResult, AssetError, AssetEvent, BatchId, BatchReport, BatchSummary, FileOpTask, SubmittedBatch,
    TaskReport, TaskStatus,
};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::events::EventBus;
use crate::index::PathIndex;
use crate::usage::UsageGraph;
use crate::watch::WatchEvent;

/// Receives the synthetic watch events of successful mutations.
pub trait ChangeSink: Send + Sync {
    fn push(&self, event: WatchEvent);
}

struct CoordinatorShared {
    index: Arc<PathIndex>,
    graph: Arc<UsageGraph>,
    executor: Arc<dyn TaskExecutor>,
    flow: FlowController,
    tracker: BatchTracker,
    sink: Arc<dyn ChangeSink>,
    shutdown: CancellationToken,
    events: EventBus<AssetEvent>,
}

#[derive(Clone)]
pub struct FileOpsCoordinator {
    shared: Arc<CoordinatorShared>,
}

pub struct CoordinatorParts {
    pub index: Arc<PathIndex>,
    pub graph: Arc<UsageGraph>,
    pub executor: Arc<dyn TaskExecutor>,
    pub workers: usize,
    pub archived_batches: usize,
    pub sink: Arc<dyn ChangeSink>,
    pub shutdown: CancellationToken,
    pub event_capacity: usize,
}

impl FileOpsCoordinator {
    pub fn new(parts: CoordinatorParts) -> Self {
        Self {
            shared: Arc::new(CoordinatorShared {
                index: parts.index,
                graph: parts.graph,
                executor: parts.executor,
                flow: FlowController::new(parts.workers),
                tracker: BatchTracker::new(parts.archived_batches),
                sink: parts.sink,
                shutdown: parts.shutdown,
                events: EventBus::new(parts.event_capacity),
            }),
        }
    }

    pub fn events(&self) -> &EventBus<AssetEvent> {
        &self.shared.events
    }

    /// Run preflight and start the batch in the background.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn submit(&self, tasks: Vec<FileOpTask>) -> ApiResult<SubmittedBatch> {
        let verdicts = preflight::preflight(&tasks, &self.shared.index, &self.shared.graph)?;
        let preflight: Vec<TaskStatus> = verdicts
            .iter()
            .map(|verdict| match verdict {
                Ok(_) => TaskStatus::Pending,
                Err(reason) => TaskStatus::Conflicted(reason.clone()),
            })
            .collect();

        let cancel = self.shared.shutdown.child_token();
        let id = self.shared.tracker.register_batch(cancel.clone());
        let conflicts = preflight.iter().filter(|s| s.is_terminal()).count();
        tracing::info!(
            "Submitted {} with {} task(s), {} conflict(s)",
            id,
            tasks.len(),
            conflicts
        );

        tokio::spawn(run_batch(
            self.shared.clone(),
            id,
            tasks,
            verdicts,
            preflight.clone(),
            cancel,
        ));

        Ok(SubmittedBatch { id, preflight })
    }

    pub fn cancel(&self, id: BatchId) -> bool {
        let cancelled = self.shared.tracker.cancel(id);
        if cancelled {
            tracing::info!("Cancellation requested for {}", id);
        }
        cancelled
    }

    pub async fn wait(&self, id: BatchId) -> ApiResult<BatchReport> {
        match self.shared.tracker.waiter(id) {
            BatchWaiter::Finished(report) => Ok(report),
            BatchWaiter::Pending(rx) => rx
                .await
                .map_err(|_| AssetError::Internal(format!("{id} was dropped before finishing"))),
            BatchWaiter::Unknown => Err(AssetError::Internal(format!("unknown {id}"))),
        }
    }

    pub fn report(&self, id: BatchId) -> Option<BatchReport> {
        self.shared.tracker.report(id)
    }

    pub fn running(&self) -> Vec<BatchId> {
        self.shared.tracker.running()
    }
}

struct BatchProgress {
    id: BatchId,
    total: usize,
    completed: AtomicUsize,
    statuses: Mutex<Vec<TaskStatus>>,
}

impl BatchProgress {
    fn set(&self, idx: usize, status: TaskStatus, events: &EventBus<AssetEvent>) {
        let terminal = status.is_terminal();
        {
            let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = statuses.get_mut(idx) {
                *slot = status;
            }
        }
        if terminal {
            let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
            events.publish(AssetEvent::BatchProgress {
                batch: self.id,
                completed,
                total: self.total,
            });
        }
    }

    fn snapshot(&self) -> Vec<TaskStatus> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

async fn run_batch(
    shared: Arc<CoordinatorShared>,
    id: BatchId,
    tasks: Vec<FileOpTask>,
    verdicts: Vec<Verdict>,
    initial: Vec<TaskStatus>,
    cancel: CancellationToken,
) {
    let conflicts = initial.iter().filter(|s| s.is_terminal()).count();
    let progress = Arc::new(BatchProgress {
        id,
        total: tasks.len(),
        completed: AtomicUsize::new(conflicts),
        statuses: Mutex::new(initial),
    });

    let mut running = JoinSet::new();
    for (idx, verdict) in verdicts.into_iter().enumerate() {
        let Ok(op) = verdict else { continue };

        if cancel.is_cancelled() {
            progress.set(idx, TaskStatus::Cancelled, &shared.events);
            continue;
        }
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = shared.flow.acquire_in_flight() => permit.ok(),
        };
        let permit = match permit {
            Some(permit) if !cancel.is_cancelled() => permit,
            _ => {
                progress.set(idx, TaskStatus::Cancelled, &shared.events);
                continue;
            }
        };

        progress.set(idx, TaskStatus::Running, &shared.events);
        let shared = shared.clone();
        let progress = progress.clone();
        running.spawn(async move {
            let _permit = permit;
            let executor = shared.executor.clone();
            let shutdown = shared.shutdown.clone();
            let result = tokio::task::spawn_blocking(move || executor.execute(&op, &shutdown))
                .await
                .unwrap_or_else(|e| Err(io::Error::other(format!("file-op task failed: {e}")).into()));

            let (changes, outcome) = match result {
                Ok(changes) => (changes, Ok(())),
                Err(ExecError { error, applied }) => (applied, Err(error)),
            };
            // Partial work is reported too, so the index matches the disk.
            for change in changes {
                shared.sink.push(change);
            }
            let status = match outcome {
                Ok(()) => TaskStatus::Done,
                Err(e) if e.kind() == io::ErrorKind::Interrupted && shared.shutdown.is_cancelled() => {
                    TaskStatus::Cancelled
                }
                Err(e) => {
                    tracing::warn!("Task {} of {} failed: {}", idx + 1, id, e);
                    TaskStatus::Failed(e.to_string())
                }
            };
            progress.set(idx, status, &shared.events);
        });
    }

    while running.join_next().await.is_some() {}

    let statuses = progress.snapshot();
    let summary = BatchSummary::from_statuses(&statuses);
    tracing::info!("Finished {}: {}", id, summary);

    let report = BatchReport {
        id,
        summary: summary.clone(),
        tasks: tasks
            .into_iter()
            .zip(statuses)
            .map(|(task, status)| TaskReport { task, status })
            .collect(),
    };
    shared.events.publish(AssetEvent::BatchFinished { batch: id, summary });
    shared.tracker.finish(report);
}
