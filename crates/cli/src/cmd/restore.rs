//! Restore a document to an earlier checkpoint

use crate::util;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;

pub async fn run(file: &Path, reference: &str) -> Result<()> {
    let workspace = util::open_workspace()?;
    let file_key = util::document_key(&workspace, file)?;

    let checkpoints = workspace.history().get_checkpoints(&file_key)?;
    if checkpoints.is_empty() {
        anyhow::bail!("No history for {}", file_key);
    }
    let id = util::resolve_checkpoint_ref(reference, &checkpoints)?;

    let payload = workspace
        .history()
        .restore_checkpoint(&file_key, &id)?
        .with_context(|| format!("Checkpoint {} not found", id))?;

    std::fs::write(file, &payload.content)
        .with_context(|| format!("Failed to write {}", file.display()))?;
    workspace.recovery().clear_wal(&file_key).await;

    println!(
        "{} {} to {}",
        "Restored".green().bold(),
        file_key,
        util::short_id(&id).yellow()
    );
    Ok(())
}
