//! Run garbage collection

use crate::util;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;

pub async fn run(dry_run: bool) -> Result<()> {
    let workspace = util::open_workspace()?;

    if dry_run {
        println!("{}", "Planning Garbage Collection (dry run)...".bold());
    } else {
        println!("{}", "Running Garbage Collection...".bold());
    }
    println!();

    let metrics = workspace
        .collect_garbage(dry_run)
        .context("Garbage collection failed")?;

    util::print_header(if dry_run { "GC Plan" } else { "GC Complete" });

    println!("Documents scanned:   {}", metrics.documents_scanned);
    println!("Reachable objects:   {}", metrics.reachable_objects);

    if metrics.missing_objects > 0 {
        println!(
            "Missing objects:     {} (run `folio verify`)",
            metrics.missing_objects.to_string().red()
        );
    }

    if metrics.objects_deleted == 0 {
        println!();
        println!("{}", "No garbage found - store is already clean".dimmed());
        return Ok(());
    }

    let (deleted, freed) = if dry_run {
        ("Would delete:", "Would free:")
    } else {
        ("Objects deleted:", "Space freed:")
    };
    println!("{:<21}{}", deleted, metrics.objects_deleted.to_string().yellow());
    println!("{:<21}{}", freed, util::format_size(metrics.bytes_freed).green());

    Ok(())
}
