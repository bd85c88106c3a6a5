//! Folio Core - Content-addressed storage primitives for document history
//!
//! This crate provides the foundational storage layer:
//! - BLAKE3 object hashing
//! - Object encoding with zstd compression
//! - Deduplicating object store with two-phase garbage collection
//! - Metadata directory layout and engine configuration

pub mod blob;
pub mod config;
pub mod error;
pub mod hash;
pub mod store;

pub use config::EngineConfig;
pub use error::{StoreError, StoreResult};
pub use hash::{hash_bytes, ObjectHash};
pub use store::{GcPlan, GcReport, ObjectStore, VerifyReport};

/// Name of the metadata directory inside a workspace root
pub const META_DIR: &str = ".folio";

/// Subdirectories every metadata directory carries
pub const REQUIRED_DIRS: &[&str] = &["objects", "recovery", "tmp"];

/// Common result type used throughout folio-core
pub type Result<T> = anyhow::Result<T>;
