//! Per-document checkpoint histories persisted in sled

use crate::chain::CheckpointChain;
use crate::checkpoint::{Checkpoint, DocumentPayload, TRIGGER_RESTORE};
use anyhow::{Context, Result};
use folio_core::{ObjectHash, ObjectStore};
use std::collections::HashSet;
use std::sync::Arc;
use ulid::Ulid;

/// Name of the sled tree holding document histories
const HISTORIES_TREE: &str = "histories";

/// Append-only checkpoint history for every document in a workspace
///
/// Keys are normalized document paths; values are bincode-encoded chains.
/// Callers serialize write operations per key.
pub struct CheckpointHistory {
    store: Arc<ObjectStore>,
    tree: sled::Tree,
    max_checkpoints: usize,
}

/// Result of a history integrity scan
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub total_documents: usize,
    pub total_checkpoints: usize,
    /// Keys whose record failed to decode
    pub corrupted_entries: Vec<String>,
    /// Keys whose chain violates the head or parent invariants
    pub broken_chains: Vec<String>,
    /// Referenced objects missing from the store
    pub missing_objects: Vec<(String, ObjectHash)>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.corrupted_entries.is_empty()
            && self.broken_chains.is_empty()
            && self.missing_objects.is_empty()
    }
}

impl CheckpointHistory {
    /// Open the histories tree of an existing database
    pub fn open(db: &sled::Db, store: Arc<ObjectStore>, max_checkpoints: usize) -> Result<Self> {
        let tree = db
            .open_tree(HISTORIES_TREE)
            .context("Failed to open histories tree")?;

        tracing::debug!("Opened checkpoint history ({} documents)", tree.len());

        Ok(Self {
            store,
            tree,
            max_checkpoints,
        })
    }

    /// Save a new version of a document.
    ///
    /// Returns `None` when content and sidecar both match the head.
    pub fn save(
        &self,
        file_key: &str,
        payload: &DocumentPayload,
        trigger: &str,
    ) -> Result<Option<Checkpoint>> {
        let mut chain = self.load_chain(file_key)?.unwrap_or_default();
        let (content_hash, sidecar_hash) = payload.store(&self.store)?;

        if chain.head_matches(&content_hash, &sidecar_hash) {
            tracing::debug!("No change in {}, skipping checkpoint", file_key);
            return Ok(None);
        }

        let checkpoint = chain
            .append(content_hash, sidecar_hash, &payload.content, trigger)
            .clone();
        self.enforce_cap(file_key, &mut chain);
        self.store_chain(file_key, &chain)?;

        tracing::debug!("Checkpoint {} for {} ({})", checkpoint.id, file_key, trigger);
        Ok(Some(checkpoint))
    }

    /// Save a named checkpoint.
    ///
    /// If the payload matches the head, the head itself is labeled instead.
    pub fn bookmark(
        &self,
        file_key: &str,
        payload: &DocumentPayload,
        label: &str,
        description: Option<&str>,
    ) -> Result<Checkpoint> {
        let mut chain = self.load_chain(file_key)?.unwrap_or_default();
        let (content_hash, sidecar_hash) = payload.store(&self.store)?;

        let checkpoint = match chain.head_id() {
            Some(head_id) if chain.head_matches(&content_hash, &sidecar_hash) => chain
                .get_mut(&head_id)
                .context("Head checkpoint missing from chain")?,
            _ => chain.append(content_hash, sidecar_hash, &payload.content, "bookmark"),
        };
        checkpoint.set_label(label);
        checkpoint.description = description.map(str::to_string);
        let checkpoint = checkpoint.clone();

        self.enforce_cap(file_key, &mut chain);
        self.store_chain(file_key, &chain)?;

        tracing::info!("Bookmarked {} in {} as '{}'", checkpoint.id, file_key, label);
        Ok(checkpoint)
    }

    /// Attach a label to an existing checkpoint
    pub fn label_checkpoint(&self, file_key: &str, id: &Ulid, label: &str) -> Result<bool> {
        let Some(mut chain) = self.load_chain(file_key)? else {
            return Ok(false);
        };

        match chain.get_mut(id) {
            Some(checkpoint) => checkpoint.set_label(label),
            None => return Ok(false),
        }

        self.store_chain(file_key, &chain)?;
        Ok(true)
    }

    /// Current head checkpoint of a document
    pub fn head(&self, file_key: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .load_chain(file_key)?
            .and_then(|chain| chain.head().cloned()))
    }

    pub fn get_checkpoint(&self, file_key: &str, id: &Ulid) -> Result<Option<Checkpoint>> {
        Ok(self
            .load_chain(file_key)?
            .and_then(|chain| chain.get(id).cloned()))
    }

    /// All checkpoints of a document, newest first
    pub fn get_checkpoints(&self, file_key: &str) -> Result<Vec<Checkpoint>> {
        Ok(self
            .load_chain(file_key)?
            .map(|chain| chain.newest_first())
            .unwrap_or_default())
    }

    /// Resolve a checkpoint's content through the object store
    pub fn get_content(&self, file_key: &str, id: &Ulid) -> Result<Option<DocumentPayload>> {
        match self.get_checkpoint(file_key, id)? {
            Some(checkpoint) => Ok(Some(DocumentPayload::load(&self.store, &checkpoint)?)),
            None => Ok(None),
        }
    }

    /// Bring back an older version as a new checkpoint on top of the head
    pub fn restore_checkpoint(&self, file_key: &str, id: &Ulid) -> Result<Option<DocumentPayload>> {
        let Some(mut chain) = self.load_chain(file_key)? else {
            return Ok(None);
        };
        let Some(target) = chain.get(id).cloned() else {
            return Ok(None);
        };

        let payload = DocumentPayload::load(&self.store, &target)?;

        if !chain.head_matches(&target.content_hash, &target.sidecar_hash) {
            chain.append(
                target.content_hash,
                target.sidecar_hash,
                &payload.content,
                TRIGGER_RESTORE,
            );
            self.enforce_cap(file_key, &mut chain);
            self.store_chain(file_key, &chain)?;
            tracing::info!("Restored {} to checkpoint {}", file_key, id);
        }

        Ok(Some(payload))
    }

    /// Prune a document's history down to `keep` checkpoints
    pub fn prune(&self, file_key: &str, keep: usize) -> Result<usize> {
        let Some(mut chain) = self.load_chain(file_key)? else {
            return Ok(0);
        };

        let removed = chain.prune(keep).len();
        if removed > 0 {
            self.store_chain(file_key, &chain)?;
        }
        Ok(removed)
    }

    /// Drop a document's history entirely
    pub fn delete_history(&self, file_key: &str) -> Result<bool> {
        let existed = self.tree.remove(file_key)?.is_some();
        self.tree.flush()?;
        Ok(existed)
    }

    /// Move a history to a new key after the document was renamed
    pub fn rename_document(&self, old_key: &str, new_key: &str) -> Result<bool> {
        if self.tree.contains_key(new_key)? {
            anyhow::bail!("History already exists for {}", new_key);
        }

        let Some(value) = self.tree.remove(old_key)? else {
            return Ok(false);
        };
        self.tree.insert(new_key, value)?;
        self.tree.flush()?;

        tracing::debug!("Moved history {} -> {}", old_key, new_key);
        Ok(true)
    }

    /// Keys of every document with a history
    pub fn documents(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for key in self.tree.iter().keys() {
            keys.push(String::from_utf8_lossy(&key?).into_owned());
        }
        Ok(keys)
    }

    /// Number of checkpoints recorded for a document
    pub fn count(&self, file_key: &str) -> Result<usize> {
        Ok(self.load_chain(file_key)?.map(|c| c.len()).unwrap_or(0))
    }

    /// Every object hash referenced by any history
    pub fn referenced_hashes(&self) -> Result<HashSet<ObjectHash>> {
        let mut hashes = HashSet::new();
        for item in self.tree.iter() {
            let (key, value) = item?;
            let chain: CheckpointChain = bincode::deserialize(&value).with_context(|| {
                format!("Corrupt history record for {}", String::from_utf8_lossy(&key))
            })?;
            chain.collect_hashes(&mut hashes);
        }
        Ok(hashes)
    }

    /// Scan every history, checking records decode, chains link up and
    /// referenced objects exist
    pub fn verify_integrity(&self) -> Result<IntegrityReport> {
        let mut report = IntegrityReport::default();

        tracing::info!("Starting history integrity check...");

        for item in self.tree.iter() {
            let (key, value) = item?;
            let file_key = String::from_utf8_lossy(&key).into_owned();
            report.total_documents += 1;

            let chain: CheckpointChain = match bincode::deserialize(&value) {
                Ok(chain) => chain,
                Err(e) => {
                    tracing::warn!("Failed to decode history for {}: {}", file_key, e);
                    report.corrupted_entries.push(file_key);
                    continue;
                }
            };

            report.total_checkpoints += chain.len();

            if !chain.is_consistent() {
                tracing::warn!("Broken checkpoint chain for {}", file_key);
                report.broken_chains.push(file_key.clone());
            }

            let mut hashes = HashSet::new();
            chain.collect_hashes(&mut hashes);
            for hash in hashes {
                if !self.store.exists(&hash) {
                    report.missing_objects.push((file_key.clone(), hash));
                }
            }
        }

        tracing::info!(
            "History check complete: {} documents, {} checkpoints",
            report.total_documents,
            report.total_checkpoints
        );
        Ok(report)
    }

    fn enforce_cap(&self, file_key: &str, chain: &mut CheckpointChain) {
        let pruned = chain.prune(self.max_checkpoints);
        if !pruned.is_empty() {
            tracing::debug!("Pruned {} checkpoints from {}", pruned.len(), file_key);
        }
    }

    fn load_chain(&self, file_key: &str) -> Result<Option<CheckpointChain>> {
        match self.tree.get(file_key)? {
            Some(value) => Ok(Some(
                bincode::deserialize(&value)
                    .with_context(|| format!("Corrupt history record for {}", file_key))?,
            )),
            None => Ok(None),
        }
    }

    fn store_chain(&self, file_key: &str, chain: &CheckpointChain) -> Result<()> {
        let value = bincode::serialize(chain)?;
        self.tree.insert(file_key, value)?;

        // Flush to ensure durability
        self.tree.flush()?;
        Ok(())
    }
}
