//! Checkpoint data structures and document payloads

use anyhow::{Context, Result};
use folio_core::{ObjectHash, ObjectStore};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Trigger recorded when restoring an older checkpoint
pub const TRIGGER_RESTORE: &str = "restore";

/// Trigger recorded on the first checkpoint of a draft
pub const TRIGGER_DRAFT_CREATED: &str = "Draft created";

/// Trigger recorded on routine saves
pub const TRIGGER_AUTOSAVE: &str = "autosave";

/// A checkpoint is an immutable snapshot of one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique ID (ULID for timestamp + uniqueness)
    pub id: Ulid,
    /// Parent checkpoint ID, `None` only for the first checkpoint of a chain
    pub parent_id: Option<Ulid>,
    /// Object holding the document text
    pub content_hash: ObjectHash,
    /// Object holding the formatting sidecar (JSON)
    pub sidecar_hash: ObjectHash,
    /// Timestamp (Unix milliseconds)
    pub ts_unix_ms: u64,
    pub kind: CheckpointKind,
    pub label: Option<String>,
    pub description: Option<String>,
    pub stats: CheckpointStats,
    /// Free-form cause, e.g. "autosave" or "restore"
    pub trigger: String,
}

/// Whether a checkpoint was named by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointKind {
    Auto,
    Bookmark,
}

/// Text statistics captured at checkpoint time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointStats {
    /// Whitespace-delimited tokens
    pub word_count: u64,
    /// Unicode scalar values
    pub char_count: u64,
    /// Absolute char count difference from the parent
    pub char_delta: u64,
}

impl CheckpointStats {
    /// Compute stats for `content`, measuring the delta against the parent's stats
    pub fn compute(content: &str, parent: Option<&CheckpointStats>) -> Self {
        let word_count = content.split_whitespace().count() as u64;
        let char_count = content.chars().count() as u64;
        let char_delta = parent
            .map(|p| char_count.abs_diff(p.char_count))
            .unwrap_or(char_count);

        Self {
            word_count,
            char_count,
            char_delta,
        }
    }
}

impl Checkpoint {
    /// Create a new auto checkpoint
    pub fn new(
        parent_id: Option<Ulid>,
        content_hash: ObjectHash,
        sidecar_hash: ObjectHash,
        stats: CheckpointStats,
        trigger: impl Into<String>,
    ) -> Self {
        Self {
            id: Ulid::new(),
            parent_id,
            content_hash,
            sidecar_hash,
            ts_unix_ms: current_timestamp_ms(),
            kind: CheckpointKind::Auto,
            label: None,
            description: None,
            stats,
            trigger: trigger.into(),
        }
    }

    /// Attach a label, turning the checkpoint into a bookmark
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = Some(label.into());
        self.kind = CheckpointKind::Bookmark;
    }

    pub fn is_bookmark(&self) -> bool {
        self.kind == CheckpointKind::Bookmark
    }

    /// Both object hashes this checkpoint references
    pub fn object_hashes(&self) -> [ObjectHash; 2] {
        [self.content_hash, self.sidecar_hash]
    }

    /// Serialize checkpoint to bytes
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize checkpoint from bytes
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// A serialized document as produced by the editing surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPayload {
    /// Document text
    pub content: String,
    /// Structured formatting metadata, opaque to the engine
    pub sidecar: serde_json::Value,
}

impl DocumentPayload {
    pub fn new(content: impl Into<String>, sidecar: serde_json::Value) -> Self {
        Self {
            content: content.into(),
            sidecar,
        }
    }

    /// Plain text with an empty sidecar object
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(content, serde_json::Value::Object(serde_json::Map::new()))
    }

    /// Write content and sidecar to the store, returning `(content_hash, sidecar_hash)`
    pub fn store(&self, store: &ObjectStore) -> Result<(ObjectHash, ObjectHash)> {
        let sidecar = serde_json::to_vec(&self.sidecar).context("Failed to encode sidecar")?;

        let content_hash = store
            .write(self.content.as_bytes())
            .context("Failed to store document content")?;
        let sidecar_hash = store
            .write(&sidecar)
            .context("Failed to store document sidecar")?;

        Ok((content_hash, sidecar_hash))
    }

    /// Resolve a checkpoint's objects back into a payload
    pub fn load(store: &ObjectStore, checkpoint: &Checkpoint) -> Result<Self> {
        let content = store
            .read(&checkpoint.content_hash)
            .with_context(|| format!("Content of checkpoint {} unreadable", checkpoint.id))?;
        let sidecar = store
            .read(&checkpoint.sidecar_hash)
            .with_context(|| format!("Sidecar of checkpoint {} unreadable", checkpoint.id))?;

        Ok(Self {
            content: String::from_utf8(content)
                .with_context(|| format!("Content of checkpoint {} is not UTF-8", checkpoint.id))?,
            sidecar: serde_json::from_slice(&sidecar)
                .with_context(|| format!("Sidecar of checkpoint {} is not JSON", checkpoint.id))?,
        })
    }
}

pub(crate) fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
