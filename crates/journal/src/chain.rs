//! Append-only checkpoint chain shared by document histories and drafts

use crate::checkpoint::{Checkpoint, CheckpointKind, CheckpointStats};
use folio_core::ObjectHash;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use ulid::Ulid;

/// Ordered checkpoints (append order) plus a head pointer
///
/// Invariants:
/// - `head_id` names a checkpoint in the list, or is `None` for an empty chain
/// - following `parent_id` from any checkpoint ends at one with no parent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointChain {
    checkpoints: Vec<Checkpoint>,
    head_id: Option<Ulid>,
}

impl CheckpointChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn head_id(&self) -> Option<Ulid> {
        self.head_id
    }

    pub fn head(&self) -> Option<&Checkpoint> {
        let head_id = self.head_id?;
        self.get(&head_id)
    }

    /// Oldest surviving checkpoint
    pub fn first(&self) -> Option<&Checkpoint> {
        self.checkpoints.first()
    }

    pub fn get(&self, id: &Ulid) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|cp| cp.id == *id)
    }

    pub fn get_mut(&mut self, id: &Ulid) -> Option<&mut Checkpoint> {
        self.checkpoints.iter_mut().find(|cp| cp.id == *id)
    }

    /// Checkpoints in append order
    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.iter()
    }

    /// Checkpoints newest first
    pub fn newest_first(&self) -> Vec<Checkpoint> {
        self.checkpoints.iter().rev().cloned().collect()
    }

    /// True if the head already holds exactly these objects
    pub fn head_matches(&self, content_hash: &ObjectHash, sidecar_hash: &ObjectHash) -> bool {
        self.head()
            .map(|head| head.content_hash == *content_hash && head.sidecar_hash == *sidecar_hash)
            .unwrap_or(false)
    }

    /// Append a checkpoint on top of the head and advance the head to it
    pub fn append(
        &mut self,
        content_hash: ObjectHash,
        sidecar_hash: ObjectHash,
        content: &str,
        trigger: &str,
    ) -> &mut Checkpoint {
        let parent = self.head();
        let parent_id = parent.map(|cp| cp.id);
        let stats = CheckpointStats::compute(content, parent.map(|cp| &cp.stats));

        let checkpoint = Checkpoint::new(parent_id, content_hash, sidecar_hash, stats, trigger);
        self.head_id = Some(checkpoint.id);
        self.checkpoints.push(checkpoint);

        let last = self.checkpoints.len() - 1;
        &mut self.checkpoints[last]
    }

    /// Prune until at most `max` checkpoints remain.
    ///
    /// The first checkpoint and the head are never removed, so at least two
    /// survive in any chain that had two. Auto checkpoints go oldest first,
    /// then bookmarks. Children of a removed checkpoint are relinked to its parent.
    pub fn prune(&mut self, max: usize) -> Vec<Checkpoint> {
        let mut removed = Vec::new();

        while self.checkpoints.len() > max {
            let Some(index) = self
                .prune_candidate(CheckpointKind::Auto)
                .or_else(|| self.prune_candidate(CheckpointKind::Bookmark))
            else {
                break;
            };

            let victim = self.checkpoints.remove(index);
            for cp in self.checkpoints.iter_mut() {
                if cp.parent_id == Some(victim.id) {
                    cp.parent_id = victim.parent_id;
                }
            }
            removed.push(victim);
        }

        removed
    }

    fn prune_candidate(&self, kind: CheckpointKind) -> Option<usize> {
        self.checkpoints
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, cp)| Some(cp.id) != self.head_id && cp.kind == kind)
            .map(|(index, _)| index)
    }

    /// Add every object hash referenced by this chain to `hashes`
    pub fn collect_hashes(&self, hashes: &mut HashSet<ObjectHash>) {
        for cp in &self.checkpoints {
            hashes.extend(cp.object_hashes());
        }
    }

    /// Check the head and parent-link invariants
    pub fn is_consistent(&self) -> bool {
        match self.head_id {
            None => return self.checkpoints.is_empty(),
            Some(head_id) if self.get(&head_id).is_none() => return false,
            Some(_) => {}
        }

        // Each walk is bounded by the chain length, so a cycle fails the check
        self.checkpoints.iter().all(|start| {
            let mut current = start;
            for _ in 0..self.checkpoints.len() {
                match current.parent_id {
                    None => return true,
                    Some(parent_id) => match self.get(&parent_id) {
                        Some(parent) => current = parent,
                        None => return false,
                    },
                }
            }
            false
        })
    }
}
