//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use folio_core::META_DIR;
use journal::{Checkpoint, Workspace};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use ulid::Ulid;

/// Find workspace root by walking up from `start` to find `.folio/`
pub fn find_workspace_root_from(start: &Path) -> Result<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if current.join(META_DIR).is_dir() {
            return Ok(current);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => anyhow::bail!("Not a Folio workspace (no {} directory found)", META_DIR),
        }
    }
}

/// Find workspace root starting from the current directory
pub fn find_workspace_root() -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    find_workspace_root_from(&cwd)
}

/// Open the workspace containing the current directory
pub fn open_workspace() -> Result<Workspace> {
    let root = find_workspace_root()?;
    Workspace::open(&root).with_context(|| format!("Failed to open workspace at {}", root.display()))
}

/// Document key for a path given on the command line
pub fn document_key(workspace: &Workspace, file: &Path) -> Result<String> {
    let path = if file.is_absolute() {
        file.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(file)
    };
    workspace.file_key(&path)
}

/// Resolve a checkpoint reference within one document's history
///
/// Supports:
/// - Full ULID: "01HN8XYZ..."
/// - Unique ULID prefix of at least 4 characters
/// - Bookmark label
pub fn resolve_checkpoint_ref(reference: &str, checkpoints: &[Checkpoint]) -> Result<Ulid> {
    if let Ok(ulid) = Ulid::from_string(reference) {
        if checkpoints.iter().any(|cp| cp.id == ulid) {
            return Ok(ulid);
        }
        anyhow::bail!("Checkpoint not found: {}", reference);
    }

    if reference.len() >= 4 {
        let upper = reference.to_ascii_uppercase();
        let matching: Vec<&Checkpoint> = checkpoints
            .iter()
            .filter(|cp| cp.id.to_string().starts_with(&upper))
            .collect();

        match matching.as_slice() {
            [only] => return Ok(only.id),
            [] => {}
            many => anyhow::bail!(
                "Ambiguous checkpoint prefix '{}': matches {} checkpoints",
                reference,
                many.len()
            ),
        }
    }

    // Newest first, so the latest checkpoint with a reused label wins
    checkpoints
        .iter()
        .find(|cp| cp.label.as_deref() == Some(reference))
        .map(|cp| cp.id)
        .with_context(|| format!("Unknown checkpoint reference: '{}'", reference))
}

/// First 8 characters of a checkpoint ID
pub fn short_id(id: &Ulid) -> String {
    id.to_string()[..8].to_string()
}

/// Format timestamp as relative time ("2 hours ago")
pub fn format_relative_time(ts_ms: u64) -> String {
    let then = UNIX_EPOCH + Duration::from_millis(ts_ms);

    match SystemTime::now().duration_since(then) {
        Ok(elapsed) => {
            let seconds = elapsed.as_secs();
            if seconds < 60 {
                format!("{} seconds ago", seconds)
            } else if seconds < 3600 {
                format!("{} minutes ago", seconds / 60)
            } else if seconds < 86400 {
                format!("{} hours ago", seconds / 3600)
            } else if seconds < 604800 {
                format!("{} days ago", seconds / 86400)
            } else {
                format!("{} weeks ago", seconds / 604800)
            }
        }
        Err(_) => "in the future".to_string(),
    }
}

/// Relative age of a file modification time
pub fn format_system_time(time: SystemTime) -> String {
    let ms = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    format_relative_time(ms)
}

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Print a checkpoint on one line
pub fn display_checkpoint_compact(cp: &Checkpoint) {
    print!("{} ", short_id(&cp.id).yellow());

    if let Some(label) = &cp.label {
        print!("({}) ", label.cyan());
    }

    print!("{} ", cp.trigger.dimmed());
    print!(
        "{} words, Δ{} chars ",
        cp.stats.word_count, cp.stats.char_delta
    );
    println!("{}", format_relative_time(cp.ts_unix_ms).dimmed());
}

/// Print a horizontal rule under a section title
pub fn print_header(title: &str) {
    println!("{}", title.bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::hash_bytes;
    use journal::CheckpointStats;

    fn checkpoint(label: Option<&str>) -> Checkpoint {
        let hash = hash_bytes(b"content");
        let mut cp = Checkpoint::new(
            None,
            hash,
            hash_bytes(b"null"),
            CheckpointStats::compute("content", None),
            "manual",
        );
        if let Some(label) = label {
            cp.set_label(label);
        }
        cp
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_format_relative_time() {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;

        assert!(format_relative_time(now_ms).ends_with("seconds ago"));
        assert_eq!(format_relative_time(now_ms - 2 * 3600 * 1000), "2 hours ago");
        assert_eq!(format_relative_time(now_ms + 3600 * 1000), "in the future");
    }

    #[test]
    fn test_resolve_checkpoint_ref() -> Result<()> {
        let first = checkpoint(None);
        let second = checkpoint(Some("draft-one"));
        let checkpoints = vec![second.clone(), first.clone()];

        assert_eq!(resolve_checkpoint_ref(&first.id.to_string(), &checkpoints)?, first.id);
        assert_eq!(resolve_checkpoint_ref("draft-one", &checkpoints)?, second.id);
        assert!(resolve_checkpoint_ref("nope", &checkpoints).is_err());
        assert!(resolve_checkpoint_ref(&Ulid::new().to_string(), &checkpoints).is_err());

        Ok(())
    }

    #[test]
    fn test_find_workspace_root_walks_up() -> Result<()> {
        let temp = tempfile::TempDir::new()?;
        std::fs::create_dir_all(temp.path().join(META_DIR))?;
        let nested = temp.path().join("a/b/c");
        std::fs::create_dir_all(&nested)?;

        assert_eq!(find_workspace_root_from(&nested)?, temp.path());
        Ok(())
    }
}
