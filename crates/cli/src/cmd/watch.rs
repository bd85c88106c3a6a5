//! Watch for external edits and checkpoint them

use crate::util;
use anyhow::{Context, Result};
use journal::{DocumentPayload, Workspace};
use owo_colors::OwoColorize;
use watcher::{ChangeKind, DocumentWatcher, ExternalChange};

/// Trigger recorded on checkpoints created by the watcher
const TRIGGER_EXTERNAL: &str = "external edit";

pub async fn run() -> Result<()> {
    let workspace = util::open_workspace()?;

    let pending = workspace.recovery().check_for_recovery().await;
    if !pending.is_empty() {
        println!(
            "{}",
            format!("{} document(s) have unsaved recovery content (see `folio recovery`)", pending.len())
                .yellow()
        );
    }

    let mut watcher = DocumentWatcher::new(workspace.root(), &workspace.config().watcher)?;
    watcher.start().context("Failed to start file watcher")?;

    println!(
        "Watching {} {}",
        workspace.root().display().to_string().cyan(),
        "(Ctrl-C to stop)".dimmed()
    );

    loop {
        tokio::select! {
            change = watcher.next_change() => {
                let Some(change) = change else { break };
                if let Err(e) = record(&workspace, &change) {
                    tracing::warn!("Failed to checkpoint {}: {:#}", change.file_key, e);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    watcher.stop();
    Ok(())
}

fn record(workspace: &Workspace, change: &ExternalChange) -> Result<()> {
    match change.kind {
        ChangeKind::Removed => {
            println!("{} {}", "removed".red(), change.file_key);
        }
        ChangeKind::Added | ChangeKind::Changed => {
            let content = std::fs::read_to_string(&change.path)
                .with_context(|| format!("Failed to read {}", change.path.display()))?;

            let saved = workspace.history().save(
                &change.file_key,
                &DocumentPayload::text(content),
                TRIGGER_EXTERNAL,
            )?;

            if let Some(cp) = saved {
                print!("{} {} ", "changed".green(), change.file_key.bold());
                util::display_checkpoint_compact(&cp);
            }
        }
    }
    Ok(())
}
