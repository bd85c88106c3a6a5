//! Native file system backend (inotify, FSEvents, ReadDirectoryChangesW via notify)

use crate::ChangeKind;
use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// A raw, undebounced event with an absolute path
pub type RawEvent = (PathBuf, ChangeKind);

/// Recursive watch on a root, forwarding converted events to a channel
pub struct NativeWatcher {
    root: PathBuf,
    watcher: RecommendedWatcher,
}

impl NativeWatcher {
    /// Start watching `root` recursively
    pub fn start(root: &Path, tx: mpsc::UnboundedSender<RawEvent>) -> Result<Self> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for raw in convert_event(&event) {
                    if tx.send(raw).is_err() {
                        // Receiver dropped
                        return;
                    }
                }
            }
            Err(e) => tracing::warn!("File watcher error: {}", e),
        })
        .context("Failed to create native file watcher")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;

        tracing::info!("Watching {}", root.display());

        Ok(Self {
            root: root.to_path_buf(),
            watcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop watching; pending raw events already sent stay in the channel
    pub fn stop(mut self) {
        if let Err(e) = self.watcher.unwatch(&self.root) {
            tracing::debug!("Failed to unwatch {}: {}", self.root.display(), e);
        }
    }
}

/// Convert a notify event into zero or more raw events
pub fn convert_event(event: &Event) -> Vec<RawEvent> {
    let single = |kind: ChangeKind| -> Vec<RawEvent> {
        event.paths.iter().map(|p| (p.clone(), kind)).collect()
    };

    match event.kind {
        EventKind::Create(_) => single(ChangeKind::Added),
        EventKind::Remove(_) => single(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => single(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => single(ChangeKind::Added),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![
                (from.clone(), ChangeKind::Removed),
                (to.clone(), ChangeKind::Added),
            ],
            _ => Vec::new(),
        },
        // Renames without a known direction: decide by whether the path still exists
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    ChangeKind::Added
                } else {
                    ChangeKind::Removed
                };
                (p.clone(), kind)
            })
            .collect(),
        EventKind::Modify(_) => single(ChangeKind::Changed),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}
