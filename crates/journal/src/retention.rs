//! Garbage collection of objects no history or draft references

use crate::drafts::DraftManager;
use crate::history::CheckpointHistory;
use anyhow::{Context, Result};
use folio_core::{GcPlan, ObjectHash, ObjectStore};
use std::collections::HashSet;
use std::time::Instant;

/// GC metrics
#[derive(Debug, Clone, Default)]
pub struct GcMetrics {
    pub documents_scanned: usize,
    pub reachable_objects: usize,
    /// Reachable hashes with no object on disk
    pub missing_objects: usize,
    pub objects_deleted: usize,
    pub bytes_freed: u64,
    pub shards_removed: usize,
    pub duration_ms: u64,
    /// Nothing was deleted; counts describe what would be
    pub dry_run: bool,
}

impl GcMetrics {
    pub fn log_summary(&self) {
        let verb = if self.dry_run { "would delete" } else { "deleted" };
        tracing::info!(
            "GC completed: {} documents scanned, {} reachable objects, {} {} objects",
            self.documents_scanned,
            self.reachable_objects,
            verb,
            self.objects_deleted
        );
        tracing::info!(
            "Space freed: {:.2} MB in {} ms",
            self.bytes_freed as f64 / (1024.0 * 1024.0),
            self.duration_ms
        );
        if self.missing_objects > 0 {
            tracing::warn!("{} referenced objects are missing", self.missing_objects);
        }
    }
}

/// Garbage collector
///
/// Marks every object referenced by any document history or any draft
/// (active, merged or archived), then sweeps the rest from the store.
pub struct GarbageCollector<'a> {
    store: &'a ObjectStore,
    history: &'a CheckpointHistory,
    drafts: &'a DraftManager,
}

impl<'a> GarbageCollector<'a> {
    pub fn new(
        store: &'a ObjectStore,
        history: &'a CheckpointHistory,
        drafts: &'a DraftManager,
    ) -> Self {
        Self {
            store,
            history,
            drafts,
        }
    }

    /// Complete reachable set across histories and drafts
    pub fn mark(&self) -> Result<HashSet<ObjectHash>> {
        let mut reachable = self
            .history
            .referenced_hashes()
            .context("Failed to collect history references")?;
        reachable.extend(
            self.drafts
                .get_all_referenced_hashes()
                .context("Failed to collect draft references")?,
        );
        Ok(reachable)
    }

    /// Run the mark phase and return the store's sweep plan
    pub fn plan(&self) -> Result<GcPlan> {
        let reachable = self.mark()?;
        Ok(self.store.plan_gc(&reachable)?)
    }

    /// Run garbage collection
    ///
    /// With `dry_run` the plan is reported and nothing is deleted.
    pub fn collect(&self, dry_run: bool) -> Result<GcMetrics> {
        let start = Instant::now();

        let plan = self.plan()?;
        let mut metrics = GcMetrics {
            documents_scanned: self.history.documents()?.len(),
            reachable_objects: plan.reachable_count,
            missing_objects: plan.missing_reachable.len(),
            dry_run,
            ..Default::default()
        };

        if dry_run {
            metrics.objects_deleted = plan.doomed.len();
            metrics.bytes_freed = plan.bytes_to_free();
        } else {
            let report = self.store.commit_gc(plan)?;
            metrics.objects_deleted = report.objects_deleted;
            metrics.bytes_freed = report.bytes_freed;
            metrics.shards_removed = report.shards_removed;
        }

        metrics.duration_ms = start.elapsed().as_millis() as u64;
        metrics.log_summary();

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::DocumentPayload;
    use folio_core::{hash_bytes, StoreError};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: Arc<ObjectStore>,
        history: CheckpointHistory,
        drafts: DraftManager,
    }

    fn setup() -> Result<Fixture> {
        let dir = TempDir::new()?;
        let store = Arc::new(ObjectStore::new(dir.path(), 3));
        let db = sled::open(dir.path().join("history.db"))?;
        let history = CheckpointHistory::open(&db, store.clone(), 200)?;
        let drafts = DraftManager::open(&db, store.clone(), 20)?;
        Ok(Fixture {
            _dir: dir,
            store,
            history,
            drafts,
        })
    }

    #[test]
    fn test_collect_keeps_history_and_draft_objects() -> Result<()> {
        let f = setup()?;
        f.history
            .save("a.md", &DocumentPayload::text("in history"), "autosave")?;
        f.drafts
            .create_draft("a.md", "d", "cp-1", &DocumentPayload::text("in draft"))?;
        let orphan = f.store.write(b"orphaned object")?;

        let gc = GarbageCollector::new(&f.store, &f.history, &f.drafts);
        let metrics = gc.collect(false)?;

        assert_eq!(metrics.objects_deleted, 1);
        assert_eq!(metrics.missing_objects, 0);
        assert!(matches!(f.store.read(&orphan), Err(StoreError::ObjectNotFound(_))));
        assert_eq!(f.store.read(&hash_bytes(b"in history"))?, b"in history");
        assert_eq!(f.store.read(&hash_bytes(b"in draft"))?, b"in draft");
        Ok(())
    }

    #[test]
    fn test_deleted_draft_objects_become_collectable() -> Result<()> {
        let f = setup()?;
        let draft = f
            .drafts
            .create_draft("a.md", "d", "cp-1", &DocumentPayload::text("doomed"))?;
        f.drafts.delete_draft("a.md", &draft.id)?;

        // Deleting the draft frees nothing by itself
        assert!(f.store.exists(&hash_bytes(b"doomed")));

        GarbageCollector::new(&f.store, &f.history, &f.drafts).collect(false)?;
        assert!(!f.store.exists(&hash_bytes(b"doomed")));
        Ok(())
    }

    #[test]
    fn test_dry_run_deletes_nothing() -> Result<()> {
        let f = setup()?;
        let orphan = f.store.write(b"still here")?;

        let metrics = GarbageCollector::new(&f.store, &f.history, &f.drafts).collect(true)?;

        assert!(metrics.dry_run);
        assert_eq!(metrics.objects_deleted, 1);
        assert!(metrics.bytes_freed > 0);
        assert!(f.store.exists(&orphan));
        Ok(())
    }

    #[test]
    fn test_pruned_checkpoints_release_objects() -> Result<()> {
        let f = setup()?;
        for i in 0..5 {
            f.history
                .save("a.md", &DocumentPayload::text(format!("rev {}", i)), "autosave")?;
        }
        f.history.prune("a.md", 2)?;

        let metrics = GarbageCollector::new(&f.store, &f.history, &f.drafts).collect(false)?;

        assert_eq!(metrics.objects_deleted, 3);
        assert!(f.store.exists(&hash_bytes(b"rev 0")));
        assert!(f.store.exists(&hash_bytes(b"rev 4")));
        assert!(!f.store.exists(&hash_bytes(b"rev 2")));
        Ok(())
    }
}
