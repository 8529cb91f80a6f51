use assetkeep_api::{FileOpTask, TaskStatus};
use assetkeep_core::AssetEngine;
use std::path::PathBuf;

async fn run_batch(engine: &AssetEngine, tasks: Vec<FileOpTask>) -> Result<(), Box<dyn std::error::Error>> {
    let submitted = engine.submit(tasks)?;
    for (idx, reason) in submitted.conflicts() {
        println!("task {} not started: {}", idx + 1, reason);
    }

    let report = engine.wait(submitted.id).await?;
    for (idx, task) in report.tasks.iter().enumerate() {
        if let TaskStatus::Failed(reason) = &task.status {
            println!("task {} failed: {}", idx + 1, reason);
        }
    }
    println!("{}: {}", report.id, report.summary);

    engine.flush().await;
    report.summary.into_result()?;
    Ok(())
}

pub async fn copy(
    path: PathBuf,
    sources: Vec<PathBuf>,
    destination: PathBuf,
    overwrite: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = crate::open_engine(path).await?;
    let tasks = sources
        .into_iter()
        .map(|source| FileOpTask::copy(source, destination.clone()).with_overwrite(overwrite))
        .collect();
    run_batch(&engine, tasks).await
}

pub async fn relocate(
    path: PathBuf,
    source: PathBuf,
    destination: PathBuf,
    overwrite: bool,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = crate::open_engine(path).await?;
    let mut task = FileOpTask::relocate(source, destination).with_overwrite(overwrite);
    if force {
        task = task.forced();
    }
    run_batch(&engine, vec![task]).await
}

pub async fn delete(path: PathBuf, assets: Vec<PathBuf>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let engine = crate::open_engine(path).await?;
    let tasks = assets
        .into_iter()
        .map(|asset| {
            let task = FileOpTask::delete(asset);
            if force { task.forced() } else { task }
        })
        .collect();
    run_batch(&engine, tasks).await
}
