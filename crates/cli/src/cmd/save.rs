//! Record a checkpoint of a document

use crate::util;
use anyhow::{Context, Result};
use journal::DocumentPayload;
use owo_colors::OwoColorize;
use std::path::Path;

pub async fn run(
    file: &Path,
    trigger: &str,
    bookmark: Option<&str>,
    sidecar: Option<&Path>,
) -> Result<()> {
    let workspace = util::open_workspace()?;
    let file_key = util::document_key(&workspace, file)?;

    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let payload = match sidecar {
        Some(path) => DocumentPayload::new(content, read_sidecar(path)?),
        None => DocumentPayload::text(content),
    };

    let checkpoint = match bookmark {
        Some(label) => Some(workspace.history().bookmark(&file_key, &payload, label, None)?),
        None => workspace.history().save(&file_key, &payload, trigger)?,
    };

    // The file on disk is canonical now
    workspace.recovery().clear_wal(&file_key).await;

    match checkpoint {
        Some(cp) => {
            print!("{} ", "Saved".green().bold());
            util::display_checkpoint_compact(&cp);
        }
        None => println!("{}", format!("No changes in {}", file_key).dimmed()),
    }

    Ok(())
}

fn read_sidecar(path: &Path) -> Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sidecar {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}
