//! Workspace handle bundling every engine component over one `.folio/` directory

use crate::drafts::DraftManager;
use crate::history::CheckpointHistory;
use crate::recovery::RecoveryManager;
use crate::retention::{GarbageCollector, GcMetrics};
use anyhow::{Context, Result};
use folio_core::store::{cleanup_temp_files, init_meta_dir, normalize_key, open_meta_dir};
use folio_core::{EngineConfig, ObjectStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Open engine state for one workspace root
///
/// Handles are owned here and passed around explicitly; there is no global
/// instance. Write operations on one document key must be serialized by the caller.
pub struct Workspace {
    root: PathBuf,
    meta_dir: PathBuf,
    config: EngineConfig,
    store: Arc<ObjectStore>,
    history: CheckpointHistory,
    drafts: DraftManager,
    recovery: RecoveryManager,
    db: sled::Db,
}

impl Workspace {
    /// Create `.folio/` under `root` with a default config and open it
    pub fn init(root: &Path) -> Result<Self> {
        let meta_dir = init_meta_dir(root)?;
        EngineConfig::default().save(&config_path(&meta_dir))?;

        tracing::info!("Initialized workspace at {}", root.display());
        Self::load(root, meta_dir)
    }

    /// Open an existing workspace, discarding interrupted writes
    pub fn open(root: &Path) -> Result<Self> {
        let meta_dir = open_meta_dir(root)?;

        let removed = cleanup_temp_files(&meta_dir)?;
        if removed > 0 {
            tracing::info!("Removed {} incomplete writes", removed);
        }

        Self::load(root, meta_dir)
    }

    fn load(root: &Path, meta_dir: PathBuf) -> Result<Self> {
        let config = EngineConfig::load(&config_path(&meta_dir))?;

        let store = Arc::new(ObjectStore::new(&meta_dir, config.store.compression_level));
        let db = sled::open(meta_dir.join("history.db"))
            .with_context(|| format!("Failed to open history database in {}", meta_dir.display()))?;

        let history = CheckpointHistory::open(&db, store.clone(), config.history.max_checkpoints)?;
        let drafts = DraftManager::open(&db, store.clone(), config.drafts.max_checkpoints)?;
        let recovery = RecoveryManager::new(
            meta_dir.join("recovery"),
            Duration::from_millis(config.recovery.interval_ms),
        );

        Ok(Self {
            root: root.to_path_buf(),
            meta_dir,
            config,
            store,
            history,
            drafts,
            recovery,
            db,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta_dir(&self) -> &Path {
        &self.meta_dir
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    pub fn history(&self) -> &CheckpointHistory {
        &self.history
    }

    pub fn drafts(&self) -> &DraftManager {
        &self.drafts
    }

    pub fn recovery(&self) -> &RecoveryManager {
        &self.recovery
    }

    /// Document key for a path, absolute or relative to the workspace root
    pub fn file_key(&self, path: &Path) -> Result<String> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root)
                .with_context(|| format!("{} is outside the workspace", path.display()))?
        } else {
            path
        };
        normalize_key(relative)
    }

    /// Garbage-collect objects unreachable from every history and draft
    pub fn collect_garbage(&self, dry_run: bool) -> Result<GcMetrics> {
        GarbageCollector::new(&self.store, &self.history, &self.drafts).collect(dry_run)
    }

    /// Move a document's history and drafts to a new key
    pub fn rename_document(&self, old_key: &str, new_key: &str) -> Result<bool> {
        let moved_history = self.history.rename_document(old_key, new_key)?;
        let moved_drafts = self.drafts.rename_document(old_key, new_key)?;
        Ok(moved_history || moved_drafts > 0)
    }

    /// Bytes used by the history database
    pub fn database_size(&self) -> Result<u64> {
        Ok(self.db.size_on_disk()?)
    }
}

fn config_path(meta_dir: &Path) -> PathBuf {
    meta_dir.join("config.toml")
}
