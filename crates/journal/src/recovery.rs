//! Write-ahead recovery of unsaved editor content
//!
//! Each open document gets a WAL file under `.folio/recovery/`, refreshed on a
//! timer while the document is open and removed after a canonical save.
//! Files are named by the BLAKE3 digest of the document key:
//!
//! ```text
//! recovery/
//!   <digest>.key   original document key (written first)
//!   <digest>.wal   latest unsaved content
//! ```
//!
//! Recovery is best-effort: I/O failures are logged and swallowed.

use dashmap::DashMap;
use folio_core::hash_bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

const WAL_EXT: &str = "wal";
const KEY_EXT: &str = "key";

/// A recoverable WAL found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryFile {
    pub file_key: String,
    pub modified: SystemTime,
}

/// Periodic WAL snapshots of open documents
pub struct RecoveryManager {
    inner: Arc<WalWriter>,
    interval: Duration,
    /// One timer task per key
    tasks: DashMap<String, JoinHandle<()>>,
}

struct WalWriter {
    recovery_dir: PathBuf,
    /// Last content written per key
    last_written: Mutex<HashMap<String, String>>,
}

impl RecoveryManager {
    pub fn new(recovery_dir: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(WalWriter {
                recovery_dir: recovery_dir.into(),
                last_written: Mutex::new(HashMap::new()),
            }),
            interval,
            tasks: DashMap::new(),
        }
    }

    pub fn recovery_dir(&self) -> &Path {
        &self.inner.recovery_dir
    }

    /// Start snapshotting a document.
    ///
    /// Every interval the supplier is asked for the current content, which is
    /// written only if it changed since the last write. Replaces any timer
    /// already running for the key. Must be called within a tokio runtime.
    pub fn start_wal<F>(&self, file_key: &str, supplier: F)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.stop_wal(file_key);

        let writer = self.inner.clone();
        let key = file_key.to_string();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let content = supplier();
                writer.write_if_changed(&key, content).await;
            }
        });

        self.tasks.insert(file_key.to_string(), handle);
        tracing::debug!("Started WAL for {} every {:?}", file_key, period);
    }

    /// Write a snapshot immediately, regardless of the timer
    pub async fn update_wal_now(&self, file_key: &str, content: &str) {
        self.inner.write(file_key, content.to_string()).await;
    }

    /// Cancel a document's timer without deleting its WAL
    pub fn stop_wal(&self, file_key: &str) {
        if let Some((_, handle)) = self.tasks.remove(file_key) {
            handle.abort();
            tracing::debug!("Stopped WAL for {}", file_key);
        }
        self.inner.last_written.lock().remove(file_key);
    }

    /// Cancel every timer without deleting any WAL
    pub fn stop_all_wal(&self) {
        let keys: Vec<String> = self.tasks.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.stop_wal(&key);
        }
        self.inner.last_written.lock().clear();
    }

    /// Number of running WAL timers
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    /// Delete a document's WAL after a successful canonical save
    pub async fn clear_wal(&self, file_key: &str) {
        // The next snapshot must be written even if it matches the cleared one
        self.inner.last_written.lock().remove(file_key);

        let (wal, key) = self.inner.paths(file_key);
        remove_quietly(&wal).await;
        remove_quietly(&key).await;
    }

    /// Scan the recovery directory for WAL files left behind
    pub async fn check_for_recovery(&self) -> Vec<RecoveryFile> {
        let mut found = Vec::new();

        let mut entries = match tokio::fs::read_dir(&self.inner.recovery_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return found,
            Err(e) => {
                tracing::warn!("Failed to scan recovery directory: {}", e);
                return found;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read recovery entry: {}", e);
                    break;
                }
            };

            let wal_path = entry.path();
            if wal_path.extension().and_then(|e| e.to_str()) != Some(WAL_EXT) {
                continue;
            }

            let key_path = wal_path.with_extension(KEY_EXT);
            let file_key = match tokio::fs::read_to_string(&key_path).await {
                Ok(key) => key,
                Err(_) => {
                    tracing::debug!("Skipping WAL without key file: {}", wal_path.display());
                    continue;
                }
            };

            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    tracing::warn!("Failed to stat {}: {}", wal_path.display(), e);
                    continue;
                }
            };

            found.push(RecoveryFile { file_key, modified });
        }

        found.sort_by(|a, b| a.file_key.cmp(&b.file_key));
        found
    }

    pub async fn has_recovery(&self, file_key: &str) -> bool {
        let (wal, key) = self.inner.paths(file_key);
        matches!(tokio::fs::try_exists(&wal).await, Ok(true))
            && matches!(tokio::fs::try_exists(&key).await, Ok(true))
    }

    pub async fn get_recovery_content(&self, file_key: &str) -> Option<String> {
        let (wal, _) = self.inner.paths(file_key);
        match tokio::fs::read_to_string(&wal).await {
            Ok(content) => Some(content),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!("Failed to read WAL for {}: {}", file_key, e);
                None
            }
        }
    }

    /// Recovered content for a document; the WAL is kept until discarded
    pub async fn apply_recovery(&self, file_key: &str) -> Option<String> {
        self.get_recovery_content(file_key).await
    }

    pub async fn discard_recovery(&self, file_key: &str) {
        self.clear_wal(file_key).await;
    }

    /// Delete every WAL and key file, returning how many documents were dropped
    pub async fn discard_all_recovery(&self) -> usize {
        let pending = self.check_for_recovery().await;
        for file in &pending {
            self.clear_wal(&file.file_key).await;
        }

        // Orphaned halves of interrupted writes
        if let Ok(mut entries) = tokio::fs::read_dir(&self.inner.recovery_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                remove_quietly(&entry.path()).await;
            }
        }

        pending.len()
    }

    /// True only if a WAL exists and differs from what is loaded
    pub async fn has_unique_recovery(&self, file_key: &str, current_content: &str) -> bool {
        match self.get_recovery_content(file_key).await {
            Some(recovered) => recovered != current_content,
            None => false,
        }
    }
}

impl Drop for RecoveryManager {
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
    }
}

impl WalWriter {
    fn paths(&self, file_key: &str) -> (PathBuf, PathBuf) {
        let digest = hash_bytes(file_key.as_bytes()).to_hex();
        (
            self.recovery_dir.join(format!("{}.{}", digest, WAL_EXT)),
            self.recovery_dir.join(format!("{}.{}", digest, KEY_EXT)),
        )
    }

    async fn write_if_changed(&self, file_key: &str, content: String) {
        let unchanged = self
            .last_written
            .lock()
            .get(file_key)
            .map(|last| *last == content)
            .unwrap_or(false);

        if !unchanged {
            self.write(file_key, content).await;
        }
    }

    async fn write(&self, file_key: &str, content: String) {
        match self.try_write(file_key, &content).await {
            Ok(()) => {
                self.last_written.lock().insert(file_key.to_string(), content);
            }
            Err(e) => tracing::warn!("Failed to write WAL for {}: {}", file_key, e),
        }
    }

    async fn try_write(&self, file_key: &str, content: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.recovery_dir).await?;

        let (wal, key) = self.paths(file_key);
        if !tokio::fs::try_exists(&key).await? {
            tokio::fs::write(&key, file_key).await?;
        }

        // Replace the WAL atomically so a crash never leaves it half-written.
        // A timer tick and update_wal_now may race on one key.
        let staging = wal.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        let staged = match tokio::fs::write(&staging, content).await {
            Ok(()) => tokio::fs::rename(&staging, &wal).await,
            Err(e) => Err(e),
        };
        if staged.is_err() {
            remove_quietly(&staging).await;
        }
        staged
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}
