//! Inspect or discard crash-recovery files

use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;

pub async fn run(discard: bool) -> Result<()> {
    let workspace = util::open_workspace()?;
    let recovery = workspace.recovery();

    if discard {
        let removed = recovery.discard_all_recovery().await;
        println!("Discarded {} recovery file(s)", removed);
        return Ok(());
    }

    let pending = recovery.check_for_recovery().await;
    if pending.is_empty() {
        println!("{}", "No unsaved content to recover".dimmed());
        return Ok(());
    }

    util::print_header("Recoverable Documents");

    for file in &pending {
        let on_disk =
            std::fs::read_to_string(workspace.root().join(&file.file_key)).unwrap_or_default();
        let status = if recovery.has_unique_recovery(&file.file_key, &on_disk).await {
            "differs from disk".yellow().to_string()
        } else {
            "same as disk".dimmed().to_string()
        };

        println!(
            "{} ({}, {})",
            file.file_key.bold(),
            util::format_system_time(file.modified),
            status
        );
    }

    println!();
    println!("{}", "Use `folio recovery --discard` to drop them".dimmed());
    Ok(())
}
