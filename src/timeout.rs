//! Bounded calls into external collaborators.
//!
//! The rule store and the embedding provider are the only places the engine
//! can block on something it does not control. Every call into them goes
//! through [`bounded`], which turns an expired deadline into
//! `RetrievalError::Timeout` instead of hanging the caller.

use crate::types::{Result, RetrievalError};
use std::future::Future;
use std::time::Duration;

/// Operation name for rule store reads.
pub const STORE_FETCH: &str = "rule store fetch";

/// Operation name for rule store writes.
pub const STORE_INSERT: &str = "rule store insert";

/// Operation name for embedding provider calls.
pub const EMBED: &str = "embedding provider call";

/// Run `fut`, failing with `RetrievalError::Timeout` once `after` elapses.
pub async fn bounded<T, F>(operation: &'static str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = after.as_millis() as u64, "external call timed out");
            Err(RetrievalError::Timeout { operation, after })
        }
    }
}
