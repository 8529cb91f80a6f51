mod ops;
mod tree;
mod usages;
mod watch;

use assetkeep_core::{AssetEngine, Result as CoreResult};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "assetkeep",
    version,
    about = "Keeps an editor's asset folder, object cache and usage graph in sync",
    long_about = "assetkeep indexes a project's asset directory, tracks which assets reference which \
                  other assets, and performs copy, move and delete batches that refuse to break \
                  those references."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the assets and keep watching them for changes
    #[command(
        long_about = "Scans the asset directory, then watches it and logs every change until Ctrl+C. \
                      The watcher is restarted automatically when it is lost."
    )]
    Watch {
        /// Path to the project root
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,
    },
    /// List a folder the way the asset browser shows it
    Tree {
        /// Path to the project root
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,
        /// Folder to list, relative to the asset root. Defaults to the whole folder tree.
        folder: Option<String>,
        /// Only show entries whose name contains this text
        #[arg(long)]
        search: Option<String>,
    },
    /// Show which assets use an asset and whether it can be removed or moved
    Usages {
        /// Path to the project root
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,
        /// Asset id, relative to the asset root
        asset: String,
    },
    /// Copy assets into a destination (a folder receives them inside it)
    Copy {
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,
        /// Destination, relative to the asset root
        destination: PathBuf,
        /// Sources, relative to the asset root
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        /// Replace existing destinations
        #[arg(long)]
        overwrite: bool,
    },
    /// Move or rename an asset
    Move {
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,
        /// Source, relative to the asset root
        source: PathBuf,
        /// Destination, relative to the asset root
        destination: PathBuf,
        #[arg(long)]
        overwrite: bool,
        /// Move even when references to it might break
        #[arg(long)]
        force: bool,
    },
    /// Delete assets
    Delete {
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,
        /// Assets or folders, relative to the asset root
        #[arg(required = true)]
        assets: Vec<PathBuf>,
        /// Delete even when other assets use them
        #[arg(long)]
        force: bool,
    },
}

pub(crate) async fn open_engine(path: PathBuf) -> CoreResult<AssetEngine> {
    let engine = AssetEngine::builder(path).with_text_assets().build()?;
    engine.scan().await?;
    Ok(engine)
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (component, to_stderr) = match &cli.command {
        Commands::Watch { .. } => ("watch", true),
        _ => ("cli", false),
    };
    let _guard = assetkeep_core::logging::init_logging(component, to_stderr);

    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Watch { path } => rt.block_on(watch::run(path)),
        Commands::Tree { path, folder, search } => rt.block_on(tree::run(path, folder, search)),
        Commands::Usages { path, asset } => rt.block_on(usages::run(path, asset)),
        Commands::Copy {
            path,
            destination,
            sources,
            overwrite,
        } => rt.block_on(ops::copy(path, sources, destination, overwrite)),
        Commands::Move {
            path,
            source,
            destination,
            overwrite,
            force,
        } => rt.block_on(ops::relocate(path, source, destination, overwrite, force)),
        Commands::Delete { path, assets, force } => rt.block_on(ops::delete(path, assets, force)),
    }
}
