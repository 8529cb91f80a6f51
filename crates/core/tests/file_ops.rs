mod common;

use assetkeep_api::{AssetError, AssetEvent, ConflictReason, FileOpTask, MoveBlocker, TaskStatus};
use assetkeep_core::AssetEngine;
use assetkeep_core::fileops::{ExecResult, FsExecutor, PlannedOp, TaskExecutor};
use common::{Project, TIMEOUT, engine, id, test_config};
use std::io;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Reports each task as it starts, then blocks until released.
struct GatedExecutor {
    started: mpsc::UnboundedSender<String>,
    gate: Mutex<std::sync::mpsc::Receiver<()>>,
}

impl TaskExecutor for GatedExecutor {
    fn execute(&self, op: &PlannedOp, _cancel: &CancellationToken) -> ExecResult {
        let _ = self.started.send(op.source.file_name().to_string());
        let _ = self.gate.lock().unwrap().recv();
        Ok(Vec::new())
    }
}

/// Real file operations, except for sources named `bad*`.
struct FlakyExecutor;

impl TaskExecutor for FlakyExecutor {
    fn execute(&self, op: &PlannedOp, cancel: &CancellationToken) -> ExecResult {
        if op.source.file_name().starts_with("bad") {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only volume").into());
        }
        FsExecutor.execute(op, cancel)
    }
}

#[tokio::test]
async fn test_copy_batch_with_existing_destination() {
    let project = Project::new();
    project.write("gfx/a.png", "a");
    project.write("gfx/b.png", "b");
    project.write("gfx/c.png", "c");
    project.write("copy/b.png", "older b");
    let engine = engine(&project).await;
    let mut events = engine.subscribe();

    let submitted = engine
        .submit(vec![
            FileOpTask::copy("gfx/a.png", "copy"),
            FileOpTask::copy("gfx/b.png", "copy"),
            FileOpTask::copy("gfx/c.png", "copy"),
        ])
        .unwrap();
    assert_eq!(
        submitted.conflicts().collect::<Vec<_>>(),
        vec![(1, &ConflictReason::DestinationExists(id("copy/b.png")))]
    );

    let report = engine.wait(submitted.id).await.unwrap();
    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(report.summary.conflicted, 1);
    assert_eq!(report.summary.failed, 0);
    assert_eq!(report.tasks[0].status, TaskStatus::Done);
    assert!(matches!(report.tasks[1].status, TaskStatus::Conflicted(_)));

    assert_eq!(project.read("copy/a.png"), b"a");
    assert_eq!(project.read("copy/b.png"), b"older b");
    assert_eq!(project.read("copy/c.png"), b"c");

    let finished = tokio::time::timeout(TIMEOUT, async {
        loop {
            if let AssetEvent::BatchFinished { batch, summary } = events.recv().await.unwrap() {
                return (batch, summary);
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(finished, (submitted.id, report.summary.clone()));

    engine.flush().await;
    assert!(engine.index().contains(&id("copy/a.png")));
    assert!(engine.index().contains(&id("copy/c.png")));
    assert!(report.summary.into_result().is_ok());
}

#[tokio::test]
async fn test_cancel_stops_tasks_not_yet_started() {
    let project = Project::new();
    for name in ["a", "b", "c", "d", "e"] {
        project.write(&format!("gfx/{name}.png"), name);
    }
    project.mkdir("out");

    let (started_tx, mut started) = mpsc::unbounded_channel();
    let (release, gate) = std::sync::mpsc::channel();
    let engine = AssetEngine::builder(project.root())
        .with_config(assetkeep_core::AssetConfig {
            copy_workers: 1,
            ..test_config()
        })
        .with_text_assets()
        .with_executor(Arc::new(GatedExecutor {
            started: started_tx,
            gate: Mutex::new(gate),
        }))
        .build()
        .unwrap();
    engine.scan().await.unwrap();

    let tasks = ["a", "b", "c", "d", "e"]
        .iter()
        .map(|name| FileOpTask::copy(format!("gfx/{name}.png"), "out"))
        .collect();
    let submitted = engine.submit(tasks).unwrap();

    assert_eq!(started.recv().await.unwrap(), "a.png");
    release.send(()).unwrap();
    assert_eq!(started.recv().await.unwrap(), "b.png");
    assert!(engine.cancel(submitted.id));
    release.send(()).unwrap();

    let report = engine.wait(submitted.id).await.unwrap();
    let statuses: Vec<_> = report.tasks.iter().map(|t| t.status.clone()).collect();
    assert_eq!(
        statuses,
        vec![
            TaskStatus::Done,
            TaskStatus::Done,
            TaskStatus::Cancelled,
            TaskStatus::Cancelled,
            TaskStatus::Cancelled,
        ]
    );
    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(report.summary.cancelled, 3);
    assert!(started.try_recv().is_err());
    assert!(!engine.cancel(submitted.id));
}

#[tokio::test]
async fn test_delete_of_used_asset_needs_force() {
    let project = Project::new().with_level();
    let engine = engine(&project).await;
    let atlas = id("atlas/sprites.atlas");

    let submitted = engine.submit(vec![FileOpTask::delete("atlas/sprites.atlas")]).unwrap();
    assert_eq!(
        submitted.preflight,
        vec![TaskStatus::Conflicted(ConflictReason::InUse {
            target: atlas.clone(),
            users: vec![id("scene/level1.scene")],
        })]
    );
    engine.wait(submitted.id).await.unwrap();
    assert!(project.path("atlas/sprites.atlas").exists());

    let forced = engine
        .submit(vec![FileOpTask::delete("atlas/sprites.atlas").forced()])
        .unwrap();
    let report = engine.wait(forced.id).await.unwrap();
    assert_eq!(report.summary.succeeded, 1);
    assert!(!project.path("atlas/sprites.atlas").exists());

    engine.flush().await;
    assert!(!engine.index().contains(&atlas));
    assert_eq!(engine.graph().dangling(), vec![atlas]);
}

#[tokio::test]
async fn test_delete_checks() {
    let project = Project::new().with_level();
    let engine = engine(&project).await;

    let submitted = engine
        .submit(vec![
            FileOpTask::delete("scene/level1.scene"),
            FileOpTask::delete("gfx/missing.png"),
            FileOpTask::delete("gfx/hero.png"),
        ])
        .unwrap();
    assert_eq!(
        submitted.preflight,
        vec![
            TaskStatus::Conflicted(ConflictReason::UsagesUnknown {
                target: id("scene/level1.scene"),
                kind: assetkeep_api::AssetKind::Scene,
            }),
            TaskStatus::Conflicted(ConflictReason::MissingSource(id("gfx/missing.png"))),
            TaskStatus::Pending,
        ]
    );
    engine.wait(submitted.id).await.unwrap();
    assert!(!project.path("gfx/hero.png").exists());
}

#[tokio::test]
async fn test_delete_waits_for_unscanned_assets() {
    let project = Project::new().with_level();
    project.write("scene/broken.scene", [0xff, 0xfe, 0x00]);
    let engine = engine(&project).await;

    let submitted = engine
        .submit(vec![FileOpTask::delete("gfx/hero.png"), FileOpTask::delete("scene")])
        .unwrap();
    assert_eq!(
        submitted.preflight,
        vec![
            TaskStatus::Conflicted(ConflictReason::UnscannedUsers {
                target: id("gfx/hero.png"),
                unscanned: vec![id("scene/broken.scene")],
            }),
            TaskStatus::Conflicted(ConflictReason::UsagesUnknown {
                target: id("scene/broken.scene"),
                kind: assetkeep_api::AssetKind::Scene,
            }),
        ]
    );
    engine.wait(submitted.id).await.unwrap();
    assert!(project.path("gfx/hero.png").exists());

    let submitted = engine.submit(vec![FileOpTask::delete("gfx/hero.png").forced()]).unwrap();
    let report = engine.wait(submitted.id).await.unwrap();
    assert_eq!(report.tasks[0].status, TaskStatus::Done);
    assert!(!project.path("gfx/hero.png").exists());
}

#[tokio::test]
async fn test_deleting_folder_ignores_users_inside_it() {
    let project = Project::new();
    project.write("atlas/sprites.atlas", "sprites.png\nsize: 64,64\n");
    project.write("atlas/sprites.png", "png");
    let engine = engine(&project).await;

    let submitted = engine.submit(vec![FileOpTask::delete("atlas")]).unwrap();
    assert_eq!(submitted.preflight, vec![TaskStatus::Pending]);
    engine.wait(submitted.id).await.unwrap();
    engine.flush().await;

    assert!(!project.path("atlas").exists());
    assert!(!engine.index().exists(&id("atlas")));
    assert!(engine.index().files().is_empty());
}

#[tokio::test]
async fn test_move_updates_index_and_respects_usages() {
    let project = Project::new().with_level();
    let engine = engine(&project).await;

    let submitted = engine
        .submit(vec![
            FileOpTask::relocate("gfx/hero.png", "gfx/player.png"),
            FileOpTask::relocate("atlas/sprites.atlas", "atlas/ui.atlas"),
        ])
        .unwrap();
    assert_eq!(submitted.preflight[0], TaskStatus::Pending);
    assert_eq!(
        submitted.preflight[1],
        TaskStatus::Conflicted(ConflictReason::MoveBlocked {
            target: id("atlas/sprites.atlas"),
            blocker: MoveBlocker::InUse(vec![id("scene/level1.scene")]),
        })
    );

    let report = engine.wait(submitted.id).await.unwrap();
    assert_eq!(report.summary.succeeded, 1);
    engine.flush().await;

    assert!(!engine.index().contains(&id("gfx/hero.png")));
    assert!(engine.index().contains(&id("gfx/player.png")));
    assert!(engine.index().contains(&id("atlas/sprites.atlas")));
    assert_eq!(engine.list_children(&id("gfx")).unwrap(), vec![id("gfx/player.png")]);
}

#[tokio::test]
async fn test_destination_conflicts() {
    let project = Project::new();
    project.write("gfx/hero.png", "hero");
    project.write("gfx/sub/enemy.png", "enemy");
    project.mkdir("out");
    let engine = engine(&project).await;

    let submitted = engine
        .submit(vec![
            FileOpTask::copy("gfx/hero.png", "gfx"),
            FileOpTask::copy("gfx", "gfx/sub"),
            FileOpTask::copy("gfx/hero.png", "out"),
            FileOpTask::copy("gfx/hero.png", "out"),
        ])
        .unwrap();
    assert_eq!(
        submitted.preflight,
        vec![
            TaskStatus::Conflicted(ConflictReason::SameLocation(id("gfx/hero.png"))),
            TaskStatus::Conflicted(ConflictReason::IntoItself(id("gfx"))),
            TaskStatus::Pending,
            TaskStatus::Conflicted(ConflictReason::DestinationExists(id("out/hero.png"))),
        ]
    );
    engine.wait(submitted.id).await.unwrap();
    assert_eq!(project.read("out/hero.png"), b"hero");
}

#[tokio::test]
async fn test_overwrite_replaces_destination() {
    let project = Project::new();
    project.write("gfx/hero.png", "new hero");
    project.write("out/hero.png", "old hero");
    let engine = engine(&project).await;

    let submitted = engine
        .submit(vec![FileOpTask::copy("gfx/hero.png", "out").with_overwrite(true)])
        .unwrap();
    let report = engine.wait(submitted.id).await.unwrap();
    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(project.read("out/hero.png"), b"new hero");
}

#[tokio::test]
async fn test_path_outside_assets_rejects_batch() {
    let project = Project::new();
    project.write("gfx/hero.png", "hero");
    let engine = engine(&project).await;

    let err = engine
        .submit(vec![
            FileOpTask::copy("gfx/hero.png", "out"),
            FileOpTask::delete("../assetkeep.json"),
        ])
        .unwrap_err();
    assert!(matches!(err, AssetError::InvalidPath { .. }));
    assert!(engine.fileops().running().is_empty());
}

#[tokio::test]
async fn test_failed_task_reports_partial_failure() {
    let project = Project::new();
    project.write("gfx/good.png", "good");
    project.write("gfx/bad.png", "bad");
    project.mkdir("out");
    let engine = AssetEngine::builder(project.root())
        .with_config(test_config())
        .with_executor(Arc::new(FlakyExecutor))
        .build()
        .unwrap();
    engine.scan().await.unwrap();

    let submitted = engine
        .submit(vec![
            FileOpTask::copy("gfx/good.png", "out"),
            FileOpTask::copy("gfx/bad.png", "out"),
        ])
        .unwrap();
    let report = engine.wait(submitted.id).await.unwrap();

    assert_eq!(report.tasks[0].status, TaskStatus::Done);
    assert!(matches!(&report.tasks[1].status, TaskStatus::Failed(msg) if msg.contains("read-only")));
    assert!(matches!(
        report.summary.into_result(),
        Err(AssetError::PartialBatchFailure { succeeded: 1, failed: 1 })
    ));
    assert!(project.path("out/good.png").exists());
    assert!(!project.path("out/bad.png").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_failed_folder_copy_indexes_what_was_copied() {
    let project = Project::new();
    project.write("pack/a.png", "a");
    std::os::unix::fs::symlink(project.root().join("gone.png"), project.path("pack/z.png")).unwrap();
    let engine = engine(&project).await;

    let submitted = engine.submit(vec![FileOpTask::copy("pack", "copy")]).unwrap();
    let report = engine.wait(submitted.id).await.unwrap();
    engine.flush().await;

    assert!(matches!(report.tasks[0].status, TaskStatus::Failed(_)));
    assert!(project.path("copy/a.png").exists());
    assert!(engine.index().contains(&id("copy/a.png")));
    assert!(engine.index().is_folder(&id("copy")));
    assert!(!engine.index().contains(&id("copy/z.png")));
}
