//! Content-addressed object store and metadata directory management

use crate::blob;
use crate::error::{StoreError, StoreResult};
use crate::hash::{hash_bytes, ObjectHash};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Deduplicating, compressed object store
///
/// Objects live under a two-character fan-out:
/// ```text
/// .folio/
///   objects/
///     ab/
///       cdef0123...   (remaining 62 hex characters)
///   tmp/
/// ```
pub struct ObjectStore {
    /// Path to the `objects/` directory
    objects_dir: PathBuf,
    /// Staging directory for atomic writes
    tmp_dir: PathBuf,
    /// zstd level used for new objects
    compression_level: i32,
    /// Bumped by every `write` call, dedup hits included
    generation: AtomicU64,
}

/// Mark phase result of a two-phase garbage collection
#[derive(Debug, Clone)]
pub struct GcPlan {
    /// Store generation the plan was computed at
    pub generation: u64,
    /// Unreachable objects and their on-disk sizes
    pub doomed: Vec<(ObjectHash, u64)>,
    /// Objects present in the store when planned
    pub total_objects: usize,
    /// Size of the reachable set supplied by the caller
    pub reachable_count: usize,
    /// Reachable hashes with no object on disk
    pub missing_reachable: Vec<ObjectHash>,
}

impl GcPlan {
    /// Total bytes the sweep would free
    pub fn bytes_to_free(&self) -> u64 {
        self.doomed.iter().map(|(_, size)| size).sum()
    }
}

/// Sweep phase result
#[derive(Debug, Clone, Default)]
pub struct GcReport {
    pub objects_deleted: usize,
    pub bytes_freed: u64,
    pub shards_removed: usize,
    pub duration_ms: u64,
}

impl GcReport {
    pub fn log_summary(&self) {
        tracing::info!(
            "GC completed: {} objects deleted, {} shard directories removed",
            self.objects_deleted,
            self.shards_removed
        );
        tracing::info!(
            "Space freed: {:.2} MB in {} ms",
            self.bytes_freed as f64 / (1024.0 * 1024.0),
            self.duration_ms
        );
    }
}

/// Result of reading back every stored object
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub total_objects: usize,
    pub valid_objects: usize,
    pub corrupt_objects: Vec<ObjectHash>,
}

impl VerifyReport {
    pub fn is_healthy(&self) -> bool {
        self.corrupt_objects.is_empty()
    }
}

impl ObjectStore {
    /// Create a store rooted at a metadata directory (`.folio/`)
    pub fn new(meta_dir: &Path, compression_level: i32) -> Self {
        Self {
            objects_dir: meta_dir.join("objects"),
            tmp_dir: meta_dir.join("tmp"),
            compression_level,
            generation: AtomicU64::new(0),
        }
    }

    /// Store bytes if absent and return their hash.
    ///
    /// Idempotent: writing the same content again only returns the hash. An
    /// existing copy that no longer reads back intact is replaced.
    pub fn write(&self, data: &[u8]) -> StoreResult<ObjectHash> {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let hash = hash_bytes(data);
        let path = self.object_path(&hash);
        if path.exists() {
            match self.read(&hash) {
                Ok(_) => return Ok(hash),
                Err(StoreError::ObjectNotFound(_)) => {
                    tracing::warn!("Repairing corrupt object {}", hash);
                }
                Err(e) => return Err(e),
            }
        }

        let serialized = blob::encode(data, self.compression_level);
        atomic_write(&self.tmp_dir, &path, &serialized)?;

        tracing::debug!("Stored object {} ({} bytes)", hash, data.len());
        Ok(hash)
    }

    /// Read and verify an object
    pub fn read(&self, hash: &ObjectHash) -> StoreResult<Vec<u8>> {
        let path = self.object_path(hash);

        let serialized = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::ObjectNotFound(hash.to_hex()));
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        let data = match blob::decode(&serialized) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Corrupt object {}: {}", hash, e);
                return Err(StoreError::ObjectNotFound(hash.to_hex()));
            }
        };

        let actual = hash_bytes(&data);
        if actual != *hash {
            tracing::warn!("Hash mismatch: expected {}, got {}", hash, actual);
            return Err(StoreError::ObjectNotFound(hash.to_hex()));
        }

        Ok(data)
    }

    /// Check if an object exists
    pub fn exists(&self, hash: &ObjectHash) -> bool {
        self.object_path(hash).is_file()
    }

    /// Filesystem path for an object
    pub fn object_path(&self, hash: &ObjectHash) -> PathBuf {
        let (prefix, rest) = hash.shard_parts();
        self.objects_dir.join(prefix).join(rest)
    }

    /// Current write generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Enumerate every stored object with its on-disk size
    pub fn scan(&self) -> StoreResult<Vec<(ObjectHash, u64)>> {
        let mut objects = Vec::new();

        if !self.objects_dir.exists() {
            return Ok(objects);
        }

        for shard_entry in fs::read_dir(&self.objects_dir)? {
            let shard_entry = shard_entry?;
            if !shard_entry.file_type()?.is_dir() {
                continue;
            }
            let prefix = shard_entry.file_name().to_string_lossy().to_string();

            for file_entry in fs::read_dir(shard_entry.path())? {
                let file_entry = file_entry?;
                let metadata = file_entry.metadata()?;
                if !metadata.is_file() {
                    continue;
                }

                let filename = file_entry.file_name().to_string_lossy().to_string();
                match ObjectHash::from_hex(&format!("{}{}", prefix, filename)) {
                    Ok(hash) => objects.push((hash, metadata.len())),
                    Err(_) => {
                        tracing::debug!("Skipping foreign file in objects/{}: {}", prefix, filename)
                    }
                }
            }
        }

        Ok(objects)
    }

    /// Enumerate stored object hashes
    pub fn iter_hashes(&self) -> StoreResult<Vec<ObjectHash>> {
        Ok(self.scan()?.into_iter().map(|(hash, _)| hash).collect())
    }

    /// Total on-disk size of stored objects
    pub fn storage_size(&self) -> StoreResult<u64> {
        Ok(self.scan()?.iter().map(|(_, size)| size).sum())
    }

    /// Number of stored objects
    pub fn object_count(&self) -> StoreResult<usize> {
        Ok(self.scan()?.len())
    }

    /// Mark phase: work out what a sweep against `reachable` would delete.
    ///
    /// The store performs no reachability analysis. `reachable` must cover
    /// every hash referenced by every history and draft.
    pub fn plan_gc(&self, reachable: &HashSet<ObjectHash>) -> StoreResult<GcPlan> {
        let generation = self.generation();
        let stored = self.scan()?;

        let present: HashSet<ObjectHash> = stored.iter().map(|(hash, _)| *hash).collect();
        let missing_reachable: Vec<ObjectHash> = reachable
            .iter()
            .filter(|hash| !present.contains(hash))
            .copied()
            .collect();

        for hash in &missing_reachable {
            tracing::warn!("Reachable object missing from store: {}", hash);
        }

        let total_objects = stored.len();
        let doomed = stored
            .into_iter()
            .filter(|(hash, _)| !reachable.contains(hash))
            .collect();

        Ok(GcPlan {
            generation,
            doomed,
            total_objects,
            reachable_count: reachable.len(),
            missing_reachable,
        })
    }

    /// Sweep phase: delete the objects a plan marked.
    ///
    /// Fails with [`StoreError::StalePlan`] if anything was written since the
    /// plan, since a doomed object may have been referenced again.
    pub fn commit_gc(&self, plan: GcPlan) -> StoreResult<GcReport> {
        let start = Instant::now();

        let current = self.generation();
        if current != plan.generation {
            return Err(StoreError::StalePlan {
                planned: plan.generation,
                current,
            });
        }

        let mut report = GcReport::default();
        for (hash, size) in &plan.doomed {
            match fs::remove_file(self.object_path(hash)) {
                Ok(()) => {
                    report.objects_deleted += 1;
                    report.bytes_freed += size;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::Io(e)),
            }
        }

        report.shards_removed = self.remove_empty_shards()?;
        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Delete every object not in `reachable`, then drop emptied shards
    pub fn gc(&self, reachable: &HashSet<ObjectHash>) -> StoreResult<GcReport> {
        let plan = self.plan_gc(reachable)?;
        self.commit_gc(plan)
    }

    /// Read back every object and report the ones that fail verification
    pub fn verify(&self) -> StoreResult<VerifyReport> {
        let mut report = VerifyReport::default();

        for hash in self.iter_hashes()? {
            report.total_objects += 1;
            match self.read(&hash) {
                Ok(_) => report.valid_objects += 1,
                Err(StoreError::ObjectNotFound(_)) => report.corrupt_objects.push(hash),
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    fn remove_empty_shards(&self) -> StoreResult<usize> {
        let mut removed = 0;

        if !self.objects_dir.exists() {
            return Ok(removed);
        }

        for shard_entry in fs::read_dir(&self.objects_dir)? {
            let shard_path = shard_entry?.path();
            if !shard_path.is_dir() {
                continue;
            }
            if fs::read_dir(&shard_path)?.next().is_none() {
                fs::remove_dir(&shard_path)?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

/// Atomic write helper
///
/// Writes data to a temporary file, fsyncs it, then renames it to the target path.
pub fn atomic_write(tmp_dir: &Path, target: &Path, data: &[u8]) -> std::io::Result<()> {
    fs::create_dir_all(tmp_dir)?;

    let temp_path = tmp_dir.join(uuid::Uuid::new_v4().to_string());

    let mut temp_file = fs::File::create(&temp_path)?;
    temp_file.write_all(data)?;
    temp_file.sync_all()?;
    drop(temp_file);

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    if let Err(e) = fs::rename(&temp_path, target) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    // Fsync parent directory for durability
    if let Some(parent) = target.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

/// Create the metadata directory under `root`
pub fn init_meta_dir(root: &Path) -> Result<PathBuf> {
    let meta_dir = root.join(crate::META_DIR);

    if meta_dir.exists() {
        anyhow::bail!("Workspace already initialized at {}", root.display());
    }

    for dir in crate::REQUIRED_DIRS {
        fs::create_dir_all(meta_dir.join(dir))
            .with_context(|| format!("Failed to create {}/{}", crate::META_DIR, dir))?;
    }

    Ok(meta_dir)
}

/// Validate an existing metadata directory under `root`
pub fn open_meta_dir(root: &Path) -> Result<PathBuf> {
    let meta_dir = root.join(crate::META_DIR);

    if !meta_dir.is_dir() {
        anyhow::bail!("Workspace not initialized at {}", root.display());
    }

    for dir in crate::REQUIRED_DIRS {
        let path = meta_dir.join(dir);
        if !path.exists() {
            tracing::warn!("Recreating missing directory {}/{}", crate::META_DIR, dir);
            fs::create_dir_all(&path)?;
        }
    }

    Ok(meta_dir)
}

/// Delete interrupted atomic writes left in `tmp/`
pub fn cleanup_temp_files(meta_dir: &Path) -> Result<usize> {
    let tmp_dir = meta_dir.join("tmp");
    let mut removed = 0;

    if !tmp_dir.exists() {
        return Ok(removed);
    }

    for entry in fs::read_dir(&tmp_dir)? {
        let path = entry?.path();
        if path.is_file() {
            fs::remove_file(&path)?;
        } else if path.is_dir() {
            fs::remove_dir_all(&path)?;
        }
        tracing::info!("Removed incomplete write: {}", path.display());
        removed += 1;
    }

    Ok(removed)
}

/// Normalize a document path into a file key
///
/// - Relative, `/`-separated
/// - Rejects `..` and absolute paths
/// - Removes `./` prefix
pub fn normalize_key(path: &Path) -> Result<String> {
    if path.is_absolute() {
        anyhow::bail!("Absolute paths not allowed: {}", path.display());
    }

    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().replace('\\', "/")),
            Component::CurDir => {}
            Component::ParentDir => {
                anyhow::bail!("Path traversal not allowed: {}", path.display());
            }
            Component::RootDir | Component::Prefix(_) => {
                anyhow::bail!("Absolute paths not allowed: {}", path.display());
            }
        }
    }

    if parts.is_empty() {
        anyhow::bail!("Empty document path");
    }

    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, ObjectStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(temp_dir.path(), 3);
        (temp_dir, store)
    }

    #[test]
    fn test_write_read_roundtrip() -> Result<()> {
        let (_dir, store) = test_store();

        let hash = store.write(b"test data for object store")?;
        assert_eq!(store.read(&hash)?, b"test data for object store");
        Ok(())
    }

    #[test]
    fn test_write_is_deduplicated() -> Result<()> {
        let (_dir, store) = test_store();

        let first = store.write(b"Hello")?;
        let size_after_first = store.storage_size()?;
        let second = store.write(b"Hello")?;

        assert_eq!(first, second);
        assert_eq!(store.object_count()?, 1);
        assert_eq!(store.storage_size()?, size_after_first);
        Ok(())
    }

    #[test]
    fn test_file_layout() -> Result<()> {
        let (dir, store) = test_store();

        let hash = store.write(b"layout")?;
        let hex = hash.to_hex();
        let expected = dir.path().join("objects").join(&hex[0..2]).join(&hex[2..]);

        assert!(expected.is_file());
        assert_eq!(store.object_path(&hash), expected);
        Ok(())
    }

    #[test]
    fn test_read_missing_is_object_not_found() {
        let (_dir, store) = test_store();

        let err = store.read(&ObjectHash::from_bytes([0xFF; 32])).unwrap_err();
        assert!(matches!(err, StoreError::ObjectNotFound(_)));
    }

    #[test]
    fn test_read_corrupt_is_object_not_found() -> Result<()> {
        let (_dir, store) = test_store();

        let hash = store.write(b"soon to be damaged")?;
        fs::write(store.object_path(&hash), b"garbage")?;

        let err = store.read(&hash).unwrap_err();
        assert!(matches!(err, StoreError::ObjectNotFound(_)));
        Ok(())
    }

    #[test]
    fn test_read_huge_stored_len_is_object_not_found() -> Result<()> {
        let (_dir, store) = test_store();

        let hash = store.write(b"hello")?;
        let mut damaged = blob::ObjectHeaderV1::new(5, u64::MAX, false).to_bytes();
        damaged.extend_from_slice(b"hello");
        fs::write(store.object_path(&hash), damaged)?;

        assert!(matches!(store.read(&hash), Err(StoreError::ObjectNotFound(_))));
        Ok(())
    }

    #[test]
    fn test_rewrite_repairs_corrupt_object() -> Result<()> {
        let (_dir, store) = test_store();

        let hash = store.write(b"worth keeping")?;
        fs::write(store.object_path(&hash), b"garbage")?;
        assert!(store.read(&hash).is_err());

        assert_eq!(store.write(b"worth keeping")?, hash);
        assert_eq!(store.read(&hash)?, b"worth keeping");
        assert_eq!(store.object_count()?, 1);
        Ok(())
    }

    #[test]
    fn test_read_tampered_payload_fails_hash_check() -> Result<()> {
        let (_dir, store) = test_store();

        let hash = store.write(b"original")?;
        let other = blob::encode(b"tampered", 3);
        fs::write(store.object_path(&hash), other)?;

        assert!(matches!(store.read(&hash), Err(StoreError::ObjectNotFound(_))));
        Ok(())
    }

    #[test]
    fn test_exists() -> Result<()> {
        let (_dir, store) = test_store();

        let hash = hash_bytes(b"exists?");
        assert!(!store.exists(&hash));
        store.write(b"exists?")?;
        assert!(store.exists(&hash));
        Ok(())
    }

    #[test]
    fn test_gc_keeps_reachable_and_drops_the_rest() -> Result<()> {
        let (dir, store) = test_store();

        let keep = store.write(b"keep me")?;
        let drop_a = store.write(b"drop a")?;
        let drop_b = store.write(b"drop b")?;

        let reachable: HashSet<_> = [keep].into_iter().collect();
        let report = store.gc(&reachable)?;

        assert_eq!(report.objects_deleted, 2);
        assert!(report.bytes_freed > 0);
        assert_eq!(store.read(&keep)?, b"keep me");
        assert!(matches!(store.read(&drop_a), Err(StoreError::ObjectNotFound(_))));
        assert!(matches!(store.read(&drop_b), Err(StoreError::ObjectNotFound(_))));

        // Only the surviving shard directory remains
        let shards = fs::read_dir(dir.path().join("objects"))?.count();
        assert_eq!(shards, 1);
        Ok(())
    }

    #[test]
    fn test_gc_with_empty_reachable_set_empties_store() -> Result<()> {
        let (_dir, store) = test_store();

        store.write(b"one")?;
        store.write(b"two")?;
        store.gc(&HashSet::new())?;

        assert_eq!(store.object_count()?, 0);
        assert_eq!(store.storage_size()?, 0);
        Ok(())
    }

    #[test]
    fn test_plan_reports_missing_reachable() -> Result<()> {
        let (_dir, store) = test_store();

        let present = store.write(b"present")?;
        let absent = hash_bytes(b"never written");
        let reachable: HashSet<_> = [present, absent].into_iter().collect();

        let plan = store.plan_gc(&reachable)?;
        assert!(plan.doomed.is_empty());
        assert_eq!(plan.missing_reachable, vec![absent]);
        assert_eq!(plan.reachable_count, 2);
        Ok(())
    }

    #[test]
    fn test_commit_rejects_stale_plan() -> Result<()> {
        let (_dir, store) = test_store();

        let orphan = store.write(b"orphan")?;
        let plan = store.plan_gc(&HashSet::new())?;
        assert_eq!(plan.doomed.len(), 1);

        // Re-writing the orphan revives it between mark and sweep
        store.write(b"orphan")?;

        let err = store.commit_gc(plan).unwrap_err();
        assert!(matches!(err, StoreError::StalePlan { .. }));
        assert!(store.exists(&orphan));
        Ok(())
    }

    #[test]
    fn test_verify_flags_corrupt_objects() -> Result<()> {
        let (_dir, store) = test_store();

        let good = store.write(b"good")?;
        let bad = store.write(b"bad")?;
        fs::write(store.object_path(&bad), b"xx")?;

        let report = store.verify()?;
        assert_eq!(report.total_objects, 2);
        assert_eq!(report.valid_objects, 1);
        assert_eq!(report.corrupt_objects, vec![bad]);
        assert!(!report.is_healthy());
        assert!(store.exists(&good));
        Ok(())
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let tmp_dir = temp_dir.path().join("tmp");
        let target = temp_dir.path().join("a").join("b").join("file.txt");

        atomic_write(&tmp_dir, &target, b"nested")?;

        assert_eq!(fs::read(&target)?, b"nested");
        assert_eq!(fs::read_dir(&tmp_dir)?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_meta_dir_init_and_open() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;

        let meta_dir = init_meta_dir(temp_dir.path())?;
        assert!(meta_dir.join("objects").is_dir());
        assert!(meta_dir.join("recovery").is_dir());

        assert!(init_meta_dir(temp_dir.path()).is_err());
        assert_eq!(open_meta_dir(temp_dir.path())?, meta_dir);
        Ok(())
    }

    #[test]
    fn test_open_uninitialized_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = open_meta_dir(temp_dir.path()).unwrap_err();
        assert!(err.to_string().contains("not initialized"));
    }

    #[test]
    fn test_cleanup_temp_files() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let meta_dir = init_meta_dir(temp_dir.path())?;
        fs::write(meta_dir.join("tmp").join("half-written"), b"partial")?;

        assert_eq!(cleanup_temp_files(&meta_dir)?, 1);
        assert_eq!(fs::read_dir(meta_dir.join("tmp"))?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_normalize_key() -> Result<()> {
        assert_eq!(normalize_key(Path::new("notes/today.md"))?, "notes/today.md");
        assert_eq!(normalize_key(Path::new("./draft.md"))?, "draft.md");
        assert_eq!(normalize_key(Path::new("a/./b.md"))?, "a/b.md");
        Ok(())
    }

    #[test]
    fn test_normalize_key_rejects_traversal_and_absolute() {
        assert!(normalize_key(Path::new("../secret.md")).is_err());
        assert!(normalize_key(Path::new("/etc/passwd")).is_err());
        assert!(normalize_key(Path::new(".")).is_err());
    }
}
