//! Local sentence-transformer embeddings via `embed_anything`.
//!
//! Loads a BERT-family model from the Hugging Face hub (cached under
//! `HF_HOME`) and runs it in-process. The default model is
//! all-MiniLM-L6-v2, 384 dimensions.

use crate::embeddings::provider::EmbeddingProvider;
use crate::types::{Embedding, Result, RetrievalError};
use async_trait::async_trait;
use embed_anything::embed_query;
use embed_anything::embeddings::embed::{Embedder, TextEmbedder};
use embed_anything::embeddings::local::bert::BertEmbedder;
use std::path::Path;
use std::sync::Arc;

/// In-process BERT embedder.
pub struct LocalEmbedder {
    embedder: Arc<Embedder>,
    dimensions: usize,
    model: String,
}

impl LocalEmbedder {
    /// Load `model`, downloading it on first use.
    ///
    /// # Arguments
    ///
    /// * `model` - Hugging Face model id (e.g. "sentence-transformers/all-MiniLM-L6-v2")
    /// * `fallback_dimensions` - Output size for models not in the known list
    /// * `cache_dir` - Used as `HF_HOME` unless one is already set
    ///
    /// # Errors
    ///
    /// Returns `RetrievalError::Embedding` if the model cannot be loaded
    pub fn load(model: &str, fallback_dimensions: usize, cache_dir: Option<&Path>) -> Result<Self> {
        if std::env::var_os("HF_HOME").is_none() {
            if let Some(dir) = cache_dir {
                std::fs::create_dir_all(dir)?;
                std::env::set_var("HF_HOME", dir);
            }
        }

        let bert = BertEmbedder::new(model.to_string(), None, None)
            .map_err(|e| RetrievalError::embedding(format!("Failed to load model {}: {}", model, e)))?;
        let embedder = Embedder::Text(TextEmbedder::Bert(Box::new(bert)));

        Ok(Self {
            embedder: Arc::new(embedder),
            dimensions: dimensions_for_model(model, fallback_dimensions),
            model: model.to_string(),
        })
    }
}

/// Output size of well-known sentence models.
fn dimensions_for_model(model: &str, fallback: usize) -> usize {
    if model.contains("MiniLM-L6") || model.contains("MiniLM-L12") {
        384
    } else if model.contains("mpnet-base") {
        768
    } else {
        fallback
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // model inference is CPU-bound; keep it off the async workers
        let embedder = Arc::clone(&self.embedder);
        let texts = texts.to_vec();
        let runtime = tokio::runtime::Handle::current();
        let output = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            runtime.block_on(embed_query(&refs, &embedder, None))
        })
        .await
        .map_err(|e| RetrievalError::embedding(format!("embedding task failed: {}", e)))?
        .map_err(|e| RetrievalError::embedding(format!("Embedding failed: {}", e)))?;

        output
            .into_iter()
            .map(|data| {
                data.embedding
                    .to_dense()
                    .map(|dense| dense.into_iter().map(f64::from).collect())
                    .map_err(|e| RetrievalError::embedding(format!("Dense conversion failed: {}", e)))
            })
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
