//! Check object and history integrity

use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;

pub async fn run() -> Result<()> {
    let workspace = util::open_workspace()?;

    println!("{}", "Verifying workspace...".bold());
    println!();

    let objects = workspace.store().verify()?;
    let history = workspace.history().verify_integrity()?;

    util::print_header("Integrity Report");

    println!(
        "Objects:       {}/{} valid",
        objects.valid_objects, objects.total_objects
    );
    for hash in &objects.corrupt_objects {
        println!("  {} corrupt object {}", "✗".red(), hash);
    }

    println!(
        "Histories:     {} documents, {} checkpoints",
        history.total_documents, history.total_checkpoints
    );
    for key in &history.corrupted_entries {
        println!("  {} unreadable history for {}", "✗".red(), key);
    }
    for key in &history.broken_chains {
        println!("  {} broken chain in {}", "✗".red(), key);
    }
    for (key, hash) in &history.missing_objects {
        println!("  {} {} references missing object {}", "✗".red(), key, hash);
    }

    println!();
    if objects.is_healthy() && history.is_healthy() {
        println!("{}", "Workspace is healthy ✓".green().bold());
        Ok(())
    } else {
        anyhow::bail!("Integrity check failed")
    }
}
