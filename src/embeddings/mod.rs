//! Embedding generation with multiple providers.
//!
//! Supports:
//! - Local sentence models via embed_anything (all-MiniLM-L6-v2, 384 dims, default)
//! - OpenAI embeddings (text-embedding-ada-002, text-embedding-3-small/large)
//! - Offline feature hashing (`hashing`), for air-gapped runs and tests
//!
//! The backend is picked from `RetrievalConfig::embedding_model`: names
//! starting with `text-embedding-` go to OpenAI (requires `OPENAI_API_KEY`),
//! `hashing` selects the hashing embedder, anything else is loaded as a local
//! model (downloaded to `<data_dir>/models` on first use).

mod hashing;
mod local;
mod openai;
mod provider;

pub use hashing::HashingEmbedder;
pub use local::LocalEmbedder;
pub use openai::OpenAIEmbedder;
pub use provider::{check_batch, EmbeddingProvider};

use crate::config::{RetrievalConfig, HASHING_MODEL};
use crate::types::{Result, RetrievalError};
use std::sync::Arc;

/// Build the configured embedding provider.
///
/// # Errors
///
/// * `RetrievalError::Config` if an OpenAI model is selected without an API
///   key, or the hashing dimensions are invalid
/// * `RetrievalError::Embedding` if a local model cannot be loaded
pub fn from_config(config: &RetrievalConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let model = config.embedding_model.as_str();

    if model.starts_with("text-embedding-") {
        let api_key = config.openai_api_key.clone().ok_or_else(|| {
            RetrievalError::Config(
                "OPENAI_API_KEY environment variable required for OpenAI models".to_string(),
            )
        })?;
        tracing::info!(model, "using OpenAI embeddings");
        let mut embedder = OpenAIEmbedder::new(api_key, model.to_string());
        if let Some(url) = &config.openai_base_url {
            embedder = embedder.with_base_url(url.as_str());
        }
        return Ok(Arc::new(embedder));
    }

    if model == HASHING_MODEL {
        tracing::info!(dimensions = config.embedding_dimensions, "using offline hashing embeddings");
        return Ok(Arc::new(HashingEmbedder::new(config.embedding_dimensions)?));
    }

    tracing::info!(model, "loading local embedding model");
    let model_dir = config.model_dir();
    Ok(Arc::new(LocalEmbedder::load(
        model,
        config.embedding_dimensions,
        Some(&model_dir),
    )?))
}
