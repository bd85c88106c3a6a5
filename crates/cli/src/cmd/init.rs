//! Initialize a Folio workspace

use anyhow::{Context, Result};
use folio_core::META_DIR;
use journal::Workspace;
use owo_colors::OwoColorize;

pub async fn run() -> Result<()> {
    let root = std::env::current_dir().context("Failed to get current directory")?;

    let workspace = Workspace::init(&root)
        .with_context(|| format!("Failed to initialize workspace at {}", root.display()))?;

    println!("{}", "Initialized Folio workspace".green().bold());
    println!();
    println!("Root:          {}", workspace.root().display().to_string().cyan());
    println!("Metadata:      {}", META_DIR);
    println!(
        "Max history:   {} checkpoints per document",
        workspace.config().history.max_checkpoints
    );
    println!(
        "Recovery:      every {}ms",
        workspace.config().recovery.interval_ms
    );
    println!();
    println!(
        "{}",
        format!("Edit {}/config.toml to change these settings", META_DIR).dimmed()
    );
    Ok(())
}
