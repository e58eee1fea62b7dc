//! Result type alias for retrieval operations.

use super::error::RetrievalError;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, RetrievalError>;
