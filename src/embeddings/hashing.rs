//! Local feature-hashing embedder.
//!
//! Maps each lowercase alphanumeric token to a bucket and sign derived from
//! its `blake3` hash, sums the signed unit weights and L2-normalises the
//! result. Texts that share vocabulary land close together; there is no
//! semantic signal beyond that. Selected explicitly with the `hashing` model
//! name for offline runs and tests, where no model download is possible.

use crate::embeddings::provider::EmbeddingProvider;
use crate::types::{Embedding, Result, RetrievalError};
use async_trait::async_trait;

/// Deterministic bag-of-tokens embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model: String,
}

impl HashingEmbedder {
    /// Create embedder producing `dimensions`-long vectors.
    ///
    /// # Errors
    ///
    /// Returns `RetrievalError::Config` if `dimensions` is zero
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RetrievalError::Config("hashing embedder needs dimensions > 0".into()));
        }
        Ok(Self {
            dimensions,
            model: format!("hashing-{}", dimensions),
        })
    }

    /// Embed one text synchronously.
    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0; self.dimensions];

        for token in tokenize(text) {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

/// Lowercase tokens split on anything that is not a letter or digit.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
