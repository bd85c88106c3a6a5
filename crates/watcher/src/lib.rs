//! External change detection for Folio documents
//!
//! This crate watches a workspace root and reports edits made by other
//! programs, layering three suppression mechanisms:
//! - A "saving" set the host marks around its own writes
//! - Per-key debouncing (500ms default, configurable)
//! - Modification-time verification of change events
//!
//! Raw events come from the native backend (see [`platform`]) or from
//! [`DocumentWatcher::ingest`], and are pulled with [`DocumentWatcher::next_change`].

pub mod debounce;
pub mod filter;
pub mod platform;

use anyhow::Result;
use dashmap::{DashMap, DashSet};
use folio_core::config::WatchConfig;
use folio_core::store::normalize_key;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;

pub use debounce::Debouncer;
pub use filter::PathFilter;

/// Kind of change to a document file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
}

/// A verified change made outside the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalChange {
    /// Document key relative to the root
    pub file_key: String,
    pub kind: ChangeKind,
    /// Absolute path of the file
    pub path: PathBuf,
}

/// Watches a root directory for external document edits
pub struct DocumentWatcher {
    /// Root path being watched
    root: PathBuf,

    filter: PathFilter,

    /// Keys the host is currently writing
    saving: DashSet<String>,

    /// Last known modification time per key
    mtimes: DashMap<String, SystemTime>,

    debouncer: Debouncer,
    debounced_rx: mpsc::UnboundedReceiver<debounce::Debounced>,

    raw_tx: mpsc::UnboundedSender<platform::RawEvent>,
    raw_rx: mpsc::UnboundedReceiver<platform::RawEvent>,

    /// Native backend, present while started
    native: Option<platform::NativeWatcher>,
}

impl DocumentWatcher {
    /// Create a watcher for `root` (not yet started)
    pub fn new(root: &Path, config: &WatchConfig) -> Result<Self> {
        // Canonicalize so native event paths (e.g. /private/var on macOS) strip cleanly
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

        let (debouncer, debounced_rx) = Debouncer::new(Duration::from_millis(config.debounce_ms));
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();

        Ok(Self {
            root,
            filter: PathFilter::new(&config.include, &config.exclude),
            saving: DashSet::new(),
            mtimes: DashMap::new(),
            debouncer,
            debounced_rx,
            raw_tx,
            raw_rx,
            native: None,
        })
    }

    /// Get the root path being watched
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    /// Document key for a path, if it is a watched document under the root
    pub fn file_key(&self, path: &Path) -> Option<String> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root).ok()?
        } else {
            path
        };

        if !self.filter.matches(relative) {
            return None;
        }
        normalize_key(relative).ok()
    }

    fn path_for(&self, file_key: &str) -> PathBuf {
        self.root.join(file_key)
    }

    /// Seed tracked mtimes and start the native backend
    pub fn start(&mut self) -> Result<()> {
        if self.native.is_some() {
            return Ok(());
        }

        let seeded = self.seed_mtimes();
        tracing::debug!("Tracking {} documents under {}", seeded, self.root.display());

        self.native = Some(platform::NativeWatcher::start(&self.root, self.raw_tx.clone())?);
        Ok(())
    }

    /// Stop the native backend; tracked state is kept
    pub fn stop(&mut self) {
        if let Some(native) = self.native.take() {
            native.stop();
            tracing::info!("Stopped watching {}", self.root.display());
        }
    }

    pub fn is_running(&self) -> bool {
        self.native.is_some()
    }

    fn seed_mtimes(&self) -> usize {
        let walker = walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|entry| {
                // Never descend into excluded directories
                match entry.path().strip_prefix(&self.root) {
                    Ok(relative) if entry.depth() > 0 => {
                        !self.filter.is_excluded(relative, entry.file_type().is_dir())
                    }
                    _ => true,
                }
            });

        let mut seeded = 0;
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = self.file_key(entry.path()) else {
                continue;
            };
            if let Some(mtime) = entry.metadata().ok().and_then(|m| m.modified().ok()) {
                self.mtimes.insert(key, mtime);
                seeded += 1;
            }
        }
        seeded
    }

    /// Feed a raw event; must be called within a tokio runtime
    pub fn ingest(&self, path: &Path, kind: ChangeKind) {
        let Some(key) = self.file_key(path) else {
            return;
        };

        if self.saving.contains(&key) {
            tracing::trace!("Dropping {:?} for {} (saving)", kind, key);
            return;
        }

        self.debouncer.push(&key, kind);
    }

    /// Mark a key as being written by the host
    pub fn mark_saving(&self, file_key: &str) {
        self.saving.insert(file_key.to_string());
    }

    /// End a host write and record the resulting mtime
    pub fn clear_saving(&self, file_key: &str) {
        self.saving.remove(file_key);
        self.update_mtime(file_key);
    }

    pub fn is_saving(&self, file_key: &str) -> bool {
        self.saving.contains(file_key)
    }

    /// Record the file's current mtime; call after every host load and save
    pub fn update_mtime(&self, file_key: &str) {
        match current_mtime(&self.path_for(file_key)) {
            Some(mtime) => {
                self.mtimes.insert(file_key.to_string(), mtime);
            }
            None => {
                tracing::debug!("Cannot stat {}, forgetting its mtime", file_key);
                self.mtimes.remove(file_key);
            }
        }
    }

    /// Stop tracking a key
    pub fn forget(&self, file_key: &str) {
        self.mtimes.remove(file_key);
        self.debouncer.cancel(file_key);
    }

    pub fn tracked_mtime(&self, file_key: &str) -> Option<SystemTime> {
        self.mtimes.get(file_key).map(|m| *m)
    }

    /// True if the file's mtime moved past the tracked one.
    ///
    /// Untracked or missing files report false.
    pub fn has_external_change(&self, file_key: &str) -> bool {
        let Some(tracked) = self.tracked_mtime(file_key) else {
            return false;
        };
        match current_mtime(&self.path_for(file_key)) {
            Some(current) => current > tracked,
            None => false,
        }
    }

    /// Number of keys waiting out their debounce window
    pub fn pending_count(&self) -> usize {
        self.debouncer.pending_count()
    }

    /// Wait for the next verified external change
    pub async fn next_change(&mut self) -> Option<ExternalChange> {
        loop {
            tokio::select! {
                Some((path, kind)) = self.raw_rx.recv() => self.ingest(&path, kind),
                Some((key, kind)) = self.debounced_rx.recv() => {
                    if let Some(change) = self.verify(key, kind) {
                        return Some(change);
                    }
                }
                else => return None,
            }
        }
    }

    /// Non-blocking variant of [`next_change`](Self::next_change)
    pub fn try_next_change(&mut self) -> Option<ExternalChange> {
        while let Ok((path, kind)) = self.raw_rx.try_recv() {
            self.ingest(&path, kind);
        }

        while let Ok((key, kind)) = self.debounced_rx.try_recv() {
            if let Some(change) = self.verify(key, kind) {
                return Some(change);
            }
        }
        None
    }

    /// Decide whether a debounced event is a real external change
    fn verify(&self, file_key: String, kind: ChangeKind) -> Option<ExternalChange> {
        if self.saving.contains(&file_key) {
            tracing::trace!("Dropping debounced {:?} for {} (saving)", kind, file_key);
            return None;
        }

        let path = self.path_for(&file_key);

        let kind = match kind {
            ChangeKind::Removed => {
                self.mtimes.remove(&file_key);
                ChangeKind::Removed
            }
            ChangeKind::Added | ChangeKind::Changed => {
                let current = current_mtime(&path)?;
                let tracked = self.tracked_mtime(&file_key);

                if let Some(tracked) = tracked {
                    if current <= tracked {
                        tracing::trace!("Ignoring no-op touch of {}", file_key);
                        return None;
                    }
                }
                self.mtimes.insert(file_key.clone(), current);

                // Atomic saves replace a tracked file; report them as edits
                match (kind, tracked) {
                    (ChangeKind::Added, Some(_)) => ChangeKind::Changed,
                    _ => kind,
                }
            }
        };

        tracing::debug!("External {:?}: {}", kind, file_key);
        Some(ExternalChange {
            file_key,
            kind,
            path,
        })
    }
}

impl Drop for DocumentWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn current_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    const DEBOUNCE: Duration = Duration::from_millis(50);

    fn setup() -> (TempDir, DocumentWatcher) {
        let temp_dir = TempDir::new().unwrap();
        let config = WatchConfig {
            debounce_ms: DEBOUNCE.as_millis() as u64,
            ..WatchConfig::default()
        };
        let watcher = DocumentWatcher::new(temp_dir.path(), &config).unwrap();
        (temp_dir, watcher)
    }

    /// Write a file and pin its mtime so comparisons do not depend on clock resolution
    fn write_with_mtime(path: &Path, content: &str, secs_after_epoch: u64) {
        fs::write(path, content).unwrap();
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs_after_epoch))
            .unwrap();
    }

    async fn settle() {
        tokio::time::sleep(DEBOUNCE * 3).await;
    }

    #[test]
    fn test_file_key_filtering() {
        let (_dir, watcher) = setup();
        let root = watcher.root().to_path_buf();

        assert_eq!(watcher.file_key(&root.join("notes/a.md")), Some("notes/a.md".to_string()));
        assert_eq!(watcher.file_key(Path::new("b.txt")), Some("b.txt".to_string()));
        assert_eq!(watcher.file_key(&root.join("image.png")), None);
        assert_eq!(watcher.file_key(&root.join(".folio/tmp/x.md")), None);
        assert_eq!(watcher.file_key(Path::new("/somewhere/else.md")), None);
    }

    #[tokio::test]
    async fn test_changed_event_emits_after_debounce() {
        let (dir, mut watcher) = setup();
        let path = watcher.root().join("a.md");
        write_with_mtime(&path, "v1", 1_000);
        watcher.update_mtime("a.md");

        write_with_mtime(&path, "v2", 2_000);
        watcher.ingest(&path, ChangeKind::Changed);

        assert!(watcher.try_next_change().is_none());
        settle().await;

        let change = watcher.try_next_change().unwrap();
        assert_eq!(change.file_key, "a.md");
        assert_eq!(change.kind, ChangeKind::Changed);
        assert_eq!(change.path, path);
        drop(dir);
    }

    #[tokio::test]
    async fn test_burst_coalesces_to_one_change() {
        let (_dir, mut watcher) = setup();
        let path = watcher.root().join("a.md");
        write_with_mtime(&path, "v1", 1_000);
        watcher.update_mtime("a.md");

        write_with_mtime(&path, "v2", 2_000);
        for _ in 0..5 {
            watcher.ingest(&path, ChangeKind::Changed);
        }
        settle().await;

        assert!(watcher.try_next_change().is_some());
        assert!(watcher.try_next_change().is_none());
    }

    #[tokio::test]
    async fn test_saving_suppresses_events() {
        let (_dir, mut watcher) = setup();
        let path = watcher.root().join("a.md");
        write_with_mtime(&path, "v1", 1_000);
        watcher.update_mtime("a.md");

        watcher.mark_saving("a.md");
        write_with_mtime(&path, "host write", 2_000);
        watcher.ingest(&path, ChangeKind::Changed);
        settle().await;
        assert!(watcher.try_next_change().is_none());

        // Late echo of the host write arrives after the mark is cleared
        watcher.clear_saving("a.md");
        watcher.ingest(&path, ChangeKind::Changed);
        settle().await;

        assert!(watcher.try_next_change().is_none());
        assert_eq!(
            watcher.tracked_mtime("a.md"),
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(2_000))
        );
    }

    #[tokio::test]
    async fn test_saving_marked_during_debounce_drops_event() {
        let (_dir, mut watcher) = setup();
        let path = watcher.root().join("a.md");
        write_with_mtime(&path, "v1", 1_000);

        watcher.ingest(&path, ChangeKind::Changed);
        watcher.mark_saving("a.md");
        settle().await;

        assert!(watcher.try_next_change().is_none());
    }

    #[tokio::test]
    async fn test_noop_touch_is_filtered() {
        let (_dir, mut watcher) = setup();
        let path = watcher.root().join("a.md");
        write_with_mtime(&path, "v1", 1_000);
        watcher.update_mtime("a.md");

        // Event without an mtime change
        watcher.ingest(&path, ChangeKind::Changed);
        settle().await;

        assert!(watcher.try_next_change().is_none());
    }

    #[tokio::test]
    async fn test_untracked_change_emits_and_starts_tracking() {
        let (_dir, mut watcher) = setup();
        let path = watcher.root().join("new.md");
        write_with_mtime(&path, "hello", 1_000);

        watcher.ingest(&path, ChangeKind::Changed);
        settle().await;

        assert!(watcher.try_next_change().is_some());
        assert!(watcher.tracked_mtime("new.md").is_some());
    }

    #[tokio::test]
    async fn test_added_and_removed() {
        let (_dir, mut watcher) = setup();
        let path = watcher.root().join("a.md");
        write_with_mtime(&path, "v1", 1_000);

        watcher.ingest(&path, ChangeKind::Added);
        settle().await;
        let added = watcher.try_next_change().unwrap();
        assert_eq!(added.kind, ChangeKind::Added);
        assert!(watcher.tracked_mtime("a.md").is_some());

        fs::remove_file(&path).unwrap();
        watcher.ingest(&path, ChangeKind::Removed);
        settle().await;
        let removed = watcher.try_next_change().unwrap();
        assert_eq!(removed.kind, ChangeKind::Removed);
        assert!(watcher.tracked_mtime("a.md").is_none());
    }

    #[tokio::test]
    async fn test_atomic_replace_of_tracked_file_reports_change() {
        let (_dir, mut watcher) = setup();
        let path = watcher.root().join("a.md");
        write_with_mtime(&path, "v1", 1_000);
        watcher.update_mtime("a.md");

        write_with_mtime(&path, "v2", 2_000);
        watcher.ingest(&path, ChangeKind::Added);
        settle().await;

        assert_eq!(watcher.try_next_change().unwrap().kind, ChangeKind::Changed);
    }

    #[tokio::test]
    async fn test_filtered_paths_are_ignored() {
        let (_dir, mut watcher) = setup();
        let root = watcher.root().to_path_buf();
        fs::create_dir_all(root.join(".folio")).unwrap();
        write_with_mtime(&root.join(".folio/x.md"), "meta", 1_000);
        write_with_mtime(&root.join("photo.jpg"), "jpeg", 1_000);

        watcher.ingest(&root.join(".folio/x.md"), ChangeKind::Changed);
        watcher.ingest(&root.join("photo.jpg"), ChangeKind::Changed);

        assert_eq!(watcher.pending_count(), 0);
        settle().await;
        assert!(watcher.try_next_change().is_none());
    }

    #[test]
    fn test_has_external_change() {
        let (_dir, watcher) = setup();
        let path = watcher.root().join("a.md");

        // Untracked and missing files fail safe
        assert!(!watcher.has_external_change("a.md"));

        write_with_mtime(&path, "v1", 1_000);
        assert!(!watcher.has_external_change("a.md"));

        watcher.update_mtime("a.md");
        assert!(!watcher.has_external_change("a.md"));

        write_with_mtime(&path, "v2", 2_000);
        assert!(watcher.has_external_change("a.md"));

        fs::remove_file(&path).unwrap();
        assert!(!watcher.has_external_change("a.md"));

        watcher.forget("a.md");
        assert!(watcher.tracked_mtime("a.md").is_none());
    }

    #[tokio::test]
    async fn test_start_seeds_mtimes() {
        let (_dir, mut watcher) = setup();
        let root = watcher.root().to_path_buf();
        fs::create_dir_all(root.join("book")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        write_with_mtime(&root.join("book/ch1.md"), "one", 1_000);
        write_with_mtime(&root.join(".hidden/secret.md"), "no", 1_000);
        write_with_mtime(&root.join("cover.png"), "png", 1_000);

        watcher.start().unwrap();
        assert!(watcher.is_running());

        assert!(watcher.tracked_mtime("book/ch1.md").is_some());
        assert!(watcher.tracked_mtime(".hidden/secret.md").is_none());
        assert!(watcher.tracked_mtime("cover.png").is_none());

        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_native_end_to_end() {
        let (_dir, mut watcher) = setup();
        let path = watcher.root().join("outside.md");
        write_with_mtime(&path, "v1", 1_000);

        watcher.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&path, "edited by another program").unwrap();

        let change = tokio::time::timeout(Duration::from_secs(5), watcher.next_change())
            .await
            .expect("timed out waiting for external change")
            .unwrap();
        assert_eq!(change.file_key, "outside.md");

        watcher.stop();
    }
}
