//! Error types for rowstore
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for rowstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Addressing Errors (caller bugs)
    // -------------------------------------------------------------------------
    #[error("Invalid handle {handle} (allocated slots: {all_count})")]
    InvalidHandle { handle: u32, all_count: u32 },

    #[error("Index {index} out of bounds (len {len})")]
    OutOfBounds { index: usize, len: usize },

    // -------------------------------------------------------------------------
    // Structural Errors
    // -------------------------------------------------------------------------
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    // -------------------------------------------------------------------------
    // Iteration Errors
    // -------------------------------------------------------------------------
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Shorthand used by every layout check that compares a buffer length
    /// against the width a schema expects.
    pub(crate) fn length(what: &str, expected: usize, actual: usize) -> Self {
        StoreError::SchemaMismatch(format!(
            "{} has length {}, expected {}",
            what, actual, expected
        ))
    }
}

/// Render a key for error messages: printable ASCII as text, otherwise hex.
pub(crate) fn display_key(key: &[u8]) -> String {
    let trimmed = match key.iter().rposition(|&b| b != 0) {
        Some(end) => &key[..=end],
        None => &key[..0],
    };
    if trimmed.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        String::from_utf8_lossy(trimmed).into_owned()
    } else {
        trimmed.iter().map(|b| format!("{:02x}", b)).collect()
    }
}
