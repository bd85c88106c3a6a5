//! Typed errors for object store operations

/// Errors surfaced by the object store.
///
/// A missing or unreadable object is an integrity violation, not routine
/// absence, so it gets its own variant instead of an `Option`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The object is absent, or present but corrupt.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// A hex digest could not be parsed.
    #[error("invalid object hash: {0}")]
    InvalidHash(String),

    /// Objects were written after a GC plan was computed.
    #[error("gc plan is stale: store generation moved from {planned} to {current}")]
    StalePlan { planned: u64, current: u64 },

    /// I/O error from the underlying file system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
