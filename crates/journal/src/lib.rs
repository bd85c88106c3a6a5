//! Document versioning on top of the Folio object store
//!
//! This crate provides:
//! - Checkpoint data structures (ULID-based IDs)
//! - Per-document checkpoint histories (sled embedded DB)
//! - Draft branches with bounded chains
//! - Write-ahead recovery of unsaved content
//! - Reachability-based garbage collection

pub mod chain;
pub mod checkpoint;
pub mod drafts;
pub mod history;
pub mod recovery;
pub mod retention;
pub mod workspace;

// Re-exports
pub use chain::CheckpointChain;
pub use checkpoint::{Checkpoint, CheckpointKind, CheckpointStats, DocumentPayload};
pub use drafts::{Draft, DraftManager, DraftStatus};
pub use history::{CheckpointHistory, IntegrityReport};
pub use recovery::{RecoveryFile, RecoveryManager};
pub use retention::{GarbageCollector, GcMetrics};
pub use workspace::Workspace;

/// Result type for journal operations
pub type Result<T> = anyhow::Result<T>;
