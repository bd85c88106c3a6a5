//! Draft branches: named, bounded editing branches of a document
//!
//! A draft starts from a document snapshot and keeps its own checkpoint chain.
//! Its lifecycle is one-way:
//!
//! ```text
//! active --save/restore--> active
//! active --apply-->        merged    (terminal)
//! active --discard-->      archived  (terminal)
//! ```
//!
//! Mutations against a merged or archived draft return `None`/`false`.

use crate::chain::CheckpointChain;
use crate::checkpoint::{
    current_timestamp_ms, Checkpoint, DocumentPayload, TRIGGER_AUTOSAVE, TRIGGER_DRAFT_CREATED,
    TRIGGER_RESTORE,
};
use anyhow::{Context, Result};
use folio_core::{ObjectHash, ObjectStore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use ulid::Ulid;

/// Name of the sled tree holding drafts
const DRAFTS_TREE: &str = "drafts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Active,
    Merged,
    Archived,
}

/// A named editing branch of one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub id: Ulid,
    pub name: String,
    pub file_key: String,
    /// Host checkpoint the draft branched from
    pub source_checkpoint_id: String,
    pub status: DraftStatus,
    pub chain: CheckpointChain,
    /// Creation time (Unix milliseconds)
    pub created_ms: u64,
    /// Last mutation time (Unix milliseconds)
    pub modified_ms: u64,
}

impl Draft {
    pub fn is_active(&self) -> bool {
        self.status == DraftStatus::Active
    }

    pub fn checkpoint_count(&self) -> usize {
        self.chain.len()
    }
}

/// Manages every draft in a workspace
///
/// Drafts are stored per document as one bincode `Vec<Draft>` under the
/// document's key. Callers serialize write operations per key.
pub struct DraftManager {
    store: Arc<ObjectStore>,
    tree: sled::Tree,
    max_checkpoints: usize,
}

impl DraftManager {
    /// Open the drafts tree of an existing database
    pub fn open(db: &sled::Db, store: Arc<ObjectStore>, max_checkpoints: usize) -> Result<Self> {
        let tree = db.open_tree(DRAFTS_TREE).context("Failed to open drafts tree")?;

        Ok(Self {
            store,
            tree,
            max_checkpoints,
        })
    }

    /// Branch a new draft off a document snapshot
    pub fn create_draft(
        &self,
        file_key: &str,
        name: &str,
        source_checkpoint_id: &str,
        payload: &DocumentPayload,
    ) -> Result<Draft> {
        let (content_hash, sidecar_hash) = payload.store(&self.store)?;

        let mut chain = CheckpointChain::new();
        chain.append(
            content_hash,
            sidecar_hash,
            &payload.content,
            TRIGGER_DRAFT_CREATED,
        );

        let now = current_timestamp_ms();
        let draft = Draft {
            id: Ulid::new(),
            name: name.to_string(),
            file_key: file_key.to_string(),
            source_checkpoint_id: source_checkpoint_id.to_string(),
            status: DraftStatus::Active,
            chain,
            created_ms: now,
            modified_ms: now,
        };

        let mut drafts = self.load(file_key)?;
        drafts.push(draft.clone());
        self.persist(file_key, &drafts)?;

        tracing::info!("Created draft '{}' ({}) for {}", name, draft.id, file_key);
        Ok(draft)
    }

    /// All drafts of a document, most recently modified first
    pub fn get_drafts(&self, file_key: &str) -> Result<Vec<Draft>> {
        let mut drafts = self.load(file_key)?;
        sort_by_modified(&mut drafts);
        Ok(drafts)
    }

    pub fn get_draft(&self, file_key: &str, draft_id: &Ulid) -> Result<Option<Draft>> {
        Ok(self.load(file_key)?.into_iter().find(|d| d.id == *draft_id))
    }

    /// Head content of a draft
    pub fn get_draft_content(
        &self,
        file_key: &str,
        draft_id: &Ulid,
    ) -> Result<Option<DocumentPayload>> {
        let Some(draft) = self.get_draft(file_key, draft_id)? else {
            return Ok(None);
        };
        match draft.chain.head() {
            Some(head) => Ok(Some(DocumentPayload::load(&self.store, head)?)),
            None => Ok(None),
        }
    }

    /// Append a checkpoint if the draft is active and the content changed
    pub fn save_draft_content(
        &self,
        file_key: &str,
        draft_id: &Ulid,
        payload: &DocumentPayload,
    ) -> Result<Option<Checkpoint>> {
        let mut drafts = self.load(file_key)?;
        let Some(draft) = find_active(&mut drafts, draft_id) else {
            return Ok(None);
        };

        let (content_hash, sidecar_hash) = payload.store(&self.store)?;
        if draft.chain.head_matches(&content_hash, &sidecar_hash) {
            return Ok(None);
        }

        let checkpoint = draft
            .chain
            .append(content_hash, sidecar_hash, &payload.content, TRIGGER_AUTOSAVE)
            .clone();
        self.touch_and_prune(draft);
        self.persist(file_key, &drafts)?;

        Ok(Some(checkpoint))
    }

    /// Rename an active draft
    pub fn rename_draft(&self, file_key: &str, draft_id: &Ulid, new_name: &str) -> Result<bool> {
        let mut drafts = self.load(file_key)?;
        let Some(draft) = find_active(&mut drafts, draft_id) else {
            return Ok(false);
        };

        draft.name = new_name.to_string();
        draft.modified_ms = current_timestamp_ms();
        self.persist(file_key, &drafts)?;
        Ok(true)
    }

    /// Bring back an older draft checkpoint as a new `restore` checkpoint
    pub fn restore_draft_checkpoint(
        &self,
        file_key: &str,
        draft_id: &Ulid,
        checkpoint_id: &Ulid,
    ) -> Result<Option<DocumentPayload>> {
        let mut drafts = self.load(file_key)?;
        let Some(draft) = find_active(&mut drafts, draft_id) else {
            return Ok(None);
        };
        let Some(target) = draft.chain.get(checkpoint_id).cloned() else {
            return Ok(None);
        };

        let payload = DocumentPayload::load(&self.store, &target)?;

        if !draft
            .chain
            .head_matches(&target.content_hash, &target.sidecar_hash)
        {
            draft.chain.append(
                target.content_hash,
                target.sidecar_hash,
                &payload.content,
                TRIGGER_RESTORE,
            );
            self.touch_and_prune(draft);
            self.persist(file_key, &drafts)?;
        }

        Ok(Some(payload))
    }

    /// Hand the draft's content back to the caller and mark it merged
    pub fn apply_draft(&self, file_key: &str, draft_id: &Ulid) -> Result<Option<DocumentPayload>> {
        let mut drafts = self.load(file_key)?;
        let Some(draft) = find_active(&mut drafts, draft_id) else {
            return Ok(None);
        };
        let Some(head) = draft.chain.head() else {
            return Ok(None);
        };

        let payload = DocumentPayload::load(&self.store, head)?;
        draft.status = DraftStatus::Merged;
        draft.modified_ms = current_timestamp_ms();
        self.persist(file_key, &drafts)?;

        tracing::info!("Applied draft {} to {}", draft_id, file_key);
        Ok(Some(payload))
    }

    /// Archive an active draft
    pub fn discard_draft(&self, file_key: &str, draft_id: &Ulid) -> Result<bool> {
        let mut drafts = self.load(file_key)?;
        let Some(draft) = find_active(&mut drafts, draft_id) else {
            return Ok(false);
        };

        draft.status = DraftStatus::Archived;
        draft.modified_ms = current_timestamp_ms();
        self.persist(file_key, &drafts)?;
        Ok(true)
    }

    /// Remove a draft record permanently
    pub fn delete_draft(&self, file_key: &str, draft_id: &Ulid) -> Result<bool> {
        let mut drafts = self.load(file_key)?;
        let before = drafts.len();
        drafts.retain(|d| d.id != *draft_id);

        if drafts.len() == before {
            return Ok(false);
        }

        self.persist(file_key, &drafts)?;
        tracing::debug!("Deleted draft {} of {}", draft_id, file_key);
        Ok(true)
    }

    /// Checkpoints of a draft, newest first
    pub fn get_draft_checkpoints(&self, file_key: &str, draft_id: &Ulid) -> Result<Vec<Checkpoint>> {
        Ok(self
            .get_draft(file_key, draft_id)?
            .map(|draft| draft.chain.newest_first())
            .unwrap_or_default())
    }

    /// Active drafts across every document, most recently modified first
    pub fn get_all_active_drafts(&self) -> Result<Vec<Draft>> {
        let mut active: Vec<Draft> = self
            .all_drafts()?
            .into_iter()
            .filter(Draft::is_active)
            .collect();
        sort_by_modified(&mut active);
        Ok(active)
    }

    pub fn count_active_drafts(&self) -> Result<usize> {
        Ok(self.all_drafts()?.iter().filter(|d| d.is_active()).count())
    }

    /// Every object hash referenced by any checkpoint of any draft
    pub fn get_all_referenced_hashes(&self) -> Result<HashSet<ObjectHash>> {
        let mut hashes = HashSet::new();
        for draft in self.all_drafts()? {
            draft.chain.collect_hashes(&mut hashes);
        }
        Ok(hashes)
    }

    /// Move drafts to a new key after the document was renamed
    pub fn rename_document(&self, old_key: &str, new_key: &str) -> Result<usize> {
        let mut drafts = self.load(old_key)?;
        if drafts.is_empty() {
            return Ok(0);
        }

        for draft in drafts.iter_mut() {
            draft.file_key = new_key.to_string();
        }

        let mut merged = self.load(new_key)?;
        let moved = drafts.len();
        merged.append(&mut drafts);

        self.persist(new_key, &merged)?;
        self.persist(old_key, &[])?;
        Ok(moved)
    }

    fn all_drafts(&self) -> Result<Vec<Draft>> {
        let mut all = Vec::new();
        for item in self.tree.iter() {
            let (key, value) = item?;
            let drafts: Vec<Draft> = bincode::deserialize(&value).with_context(|| {
                format!("Corrupt draft record for {}", String::from_utf8_lossy(&key))
            })?;
            all.extend(drafts);
        }
        Ok(all)
    }

    fn touch_and_prune(&self, draft: &mut Draft) {
        draft.modified_ms = current_timestamp_ms();
        let pruned = draft.chain.prune(self.max_checkpoints);
        if !pruned.is_empty() {
            tracing::debug!("Pruned {} checkpoints from draft {}", pruned.len(), draft.id);
        }
    }

    fn load(&self, file_key: &str) -> Result<Vec<Draft>> {
        match self.tree.get(file_key)? {
            Some(value) => bincode::deserialize(&value)
                .with_context(|| format!("Corrupt draft record for {}", file_key)),
            None => Ok(Vec::new()),
        }
    }

    fn persist(&self, file_key: &str, drafts: &[Draft]) -> Result<()> {
        if drafts.is_empty() {
            self.tree.remove(file_key)?;
        } else {
            self.tree.insert(file_key, bincode::serialize(drafts)?)?;
        }
        self.tree.flush()?;
        Ok(())
    }
}

fn find_active<'a>(drafts: &'a mut [Draft], draft_id: &Ulid) -> Option<&'a mut Draft> {
    drafts
        .iter_mut()
        .find(|d| d.id == *draft_id)
        .filter(|d| d.is_active())
}

fn sort_by_modified(drafts: &mut [Draft]) {
    // Ties fall back to id, which is creation-ordered
    drafts.sort_by(|a, b| b.modified_ms.cmp(&a.modified_ms).then(b.id.cmp(&a.id)));
}
