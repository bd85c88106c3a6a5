//! Display a document's checkpoint timeline

use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

pub async fn run(file: &Path, limit: Option<usize>) -> Result<()> {
    let workspace = util::open_workspace()?;
    let file_key = util::document_key(&workspace, file)?;

    let checkpoints = workspace.history().get_checkpoints(&file_key)?;
    if checkpoints.is_empty() {
        println!("{}", format!("No checkpoints for {}", file_key).dimmed());
        return Ok(());
    }

    let limit = limit.unwrap_or(20);
    util::print_header(&format!("History of {}", file_key));

    for checkpoint in checkpoints.iter().take(limit) {
        util::display_checkpoint_compact(checkpoint);
        if let Some(description) = &checkpoint.description {
            println!("         {}", description.dimmed());
        }
    }

    if checkpoints.len() > limit {
        println!();
        println!(
            "{}",
            format!("... {} older checkpoints (use --limit)", checkpoints.len() - limit).dimmed()
        );
    }

    let drafts = workspace.drafts().get_drafts(&file_key)?;
    let active = drafts.iter().filter(|d| d.is_active()).count();
    if active > 0 {
        println!();
        println!("{} active draft(s), see `folio drafts {}`", active, file.display());
    }

    Ok(())
}
