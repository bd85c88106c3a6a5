//! Folio CLI - folio command

use anyhow::Result;
use clap::{Parser, Subcommand};
use folio_cli::cmd;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Folio - Document versioning and recovery
#[derive(Parser)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a Folio workspace in the current directory
    Init,
    /// Record a checkpoint of a document
    Save {
        /// Document path
        file: PathBuf,
        /// What caused this checkpoint
        #[arg(long, default_value = "manual")]
        trigger: String,
        /// Label the checkpoint as a bookmark
        #[arg(short, long)]
        bookmark: Option<String>,
        /// JSON file stored alongside the content
        #[arg(long)]
        sidecar: Option<PathBuf>,
    },
    /// Show a document's checkpoint history
    Log {
        /// Document path
        file: PathBuf,
        /// Number of checkpoints to show (default: 20)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Restore a document to an earlier checkpoint
    Restore {
        /// Document path
        file: PathBuf,
        /// Checkpoint ID, unique ID prefix, or bookmark label
        checkpoint: String,
    },
    /// List drafts of a document, or every active draft
    Drafts {
        /// Document path
        file: Option<PathBuf>,
    },
    /// Remove objects no history or draft references
    Gc {
        /// Report what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },
    /// Show workspace storage statistics
    Stats,
    /// Check object and history integrity
    Verify,
    /// List unsaved content left behind by a crash
    Recovery {
        /// Delete every recovery file
        #[arg(long)]
        discard: bool,
    },
    /// Watch for external edits and checkpoint them
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => cmd::init::run().await,
        Commands::Save { file, trigger, bookmark, sidecar } => {
            cmd::save::run(&file, &trigger, bookmark.as_deref(), sidecar.as_deref()).await
        }
        Commands::Log { file, limit } => cmd::log::run(&file, limit).await,
        Commands::Restore { file, checkpoint } => cmd::restore::run(&file, &checkpoint).await,
        Commands::Drafts { file } => cmd::drafts::run(file.as_deref()).await,
        Commands::Gc { dry_run } => cmd::gc::run(dry_run).await,
        Commands::Stats => cmd::stats::run().await,
        Commands::Verify => cmd::verify::run().await,
        Commands::Recovery { discard } => cmd::recovery::run(discard).await,
        Commands::Watch => cmd::watch::run().await,
    }
}
