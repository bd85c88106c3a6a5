//! List drafts

use crate::util;
use anyhow::Result;
use journal::{Draft, DraftStatus};
use owo_colors::OwoColorize;
use std::path::Path;

pub async fn run(file: Option<&Path>) -> Result<()> {
    let workspace = util::open_workspace()?;

    let drafts = match file {
        Some(file) => {
            let file_key = util::document_key(&workspace, file)?;
            workspace.drafts().get_drafts(&file_key)?
        }
        None => workspace.drafts().get_all_active_drafts()?,
    };

    if drafts.is_empty() {
        println!("{}", "No drafts".dimmed());
        return Ok(());
    }

    util::print_header("Drafts");
    for draft in &drafts {
        display_draft(draft);
    }

    Ok(())
}

fn display_draft(draft: &Draft) {
    let status = match draft.status {
        DraftStatus::Active => "active".green().to_string(),
        DraftStatus::Merged => "merged".cyan().to_string(),
        DraftStatus::Archived => "archived".dimmed().to_string(),
    };

    println!(
        "{} {} [{}] {}",
        util::short_id(&draft.id).yellow(),
        draft.name.bold(),
        status,
        draft.file_key
    );
    println!(
        "         {} checkpoints, from {}, modified {}",
        draft.checkpoint_count(),
        draft.source_checkpoint_id,
        util::format_relative_time(draft.modified_ms)
    );
}
