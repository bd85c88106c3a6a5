//! Show workspace storage statistics

use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;

pub async fn run() -> Result<()> {
    let workspace = util::open_workspace()?;
    let history = workspace.history();

    let documents = history.documents()?;
    let mut checkpoints = 0;
    for key in &documents {
        checkpoints += history.count(key)?;
    }

    let store = workspace.store();
    let object_count = store.object_count()?;
    let object_bytes = store.storage_size()?;
    let pending = workspace.recovery().check_for_recovery().await;

    util::print_header("Workspace Statistics");

    println!("Workspace:     {}", workspace.root().display().to_string().cyan());
    println!();
    println!("Documents:     {}", documents.len());
    println!("Checkpoints:   {}", checkpoints);
    println!("Active drafts: {}", workspace.drafts().count_active_drafts()?);
    println!();
    println!("Objects:       {} ({})", object_count, util::format_size(object_bytes));
    println!("Database:      {}", util::format_size(workspace.database_size()?));

    if !pending.is_empty() {
        println!();
        println!(
            "Recovery:      {} (see `folio recovery`)",
            format!("{} unsaved document(s)", pending.len()).yellow()
        );
    }

    Ok(())
}
