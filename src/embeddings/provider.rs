//! Embedding provider trait.

use crate::types::{Embedding, Result, RetrievalError};
use async_trait::async_trait;

/// Deterministic text → fixed-dimension vector function.
///
/// Implementations must return exactly one vector per input, in input order,
/// all of length [`EmbeddingProvider::dimensions`]. A batch either succeeds
/// as a whole or fails; partial batches are never returned.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed many texts in one call.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::embedding("No embedding generated"))
    }

    /// Vector dimension, fixed for the provider's lifetime.
    fn dimensions(&self) -> usize;

    /// Model identifier, for logs and status output.
    fn model_name(&self) -> &str;
}

/// Check a provider response against the request before anyone indexes it.
///
/// # Errors
///
/// Returns `RetrievalError::Embedding` if the count differs from `expected`
/// or any vector does not have `dimensions` components
pub fn check_batch(embeddings: &[Embedding], expected: usize, dimensions: usize) -> Result<()> {
    if embeddings.len() != expected {
        return Err(RetrievalError::embedding(format!(
            "provider returned {} vectors for {} texts",
            embeddings.len(),
            expected
        )));
    }
    if let Some((position, bad)) = embeddings
        .iter()
        .enumerate()
        .find(|(_, v)| v.len() != dimensions)
    {
        return Err(RetrievalError::embedding(format!(
            "vector {} has dimension {}, expected {}",
            position,
            bad.len(),
            dimensions
        )));
    }
    Ok(())
}
