//! Error types for rule retrieval operations.
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `From` implementations.

use std::time::Duration;
use thiserror::Error;

/// Error type for every retrieval, index and store operation.
///
/// The first four variants are the domain taxonomy: callers match on them to
/// tell "search unavailable" apart from "no matches". The rest wrap the
/// underlying libraries.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Embedding provider could not produce a vector
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Rule store could not be read or written
    #[error("Rule store unavailable: {0}")]
    StoreUnavailable(String),

    /// Persisted snapshot failed validation
    #[error("Snapshot corrupt: {0}")]
    SnapshotCorrupt(String),

    /// Bounded external call did not finish in time
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Name of the external operation
        operation: &'static str,
        /// Configured bound
        after: Duration,
    },

    /// Input rejected before reaching the store
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage layer error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bincode serialization error
    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RetrievalError {
    /// Create an embedding error with context.
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create a store error with context.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a snapshot validation error with context.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::SnapshotCorrupt(msg.into())
    }

    /// Create a validation error with context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Check if error is recoverable.
    ///
    /// # Returns
    ///
    /// `true` if the operation can be retried later with the same input
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::StoreUnavailable(_) | Self::Storage(_)
        )
    }
}
