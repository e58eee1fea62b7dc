//! OpenAI embedding API client.

use crate::embeddings::provider::EmbeddingProvider;
use crate::types::{Embedding, Result, RetrievalError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI API embedding request.
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// OpenAI API embedding response.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f64>,
}

/// OpenAI embedding provider.
pub struct OpenAIEmbedder {
    api_key: String,
    model: String,
    dimensions: usize,
    base_url: String,
    client: Client,
}

impl OpenAIEmbedder {
    /// Create new OpenAI embedder.
    ///
    /// # Arguments
    ///
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (e.g., "text-embedding-3-small")
    pub fn new(api_key: String, model: String) -> Self {
        let dimensions = dimensions_for_model(&model);

        Self {
            api_key,
            model,
            dimensions,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: Client::new(),
        }
    }

    /// Point the client at a compatible endpoint (proxy, local gateway).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Call OpenAI embeddings API.
    async fn call_api(&self, input: &[String]) -> Result<Vec<Embedding>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RetrievalError::embedding(format!("OpenAI API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RetrievalError::embedding(format!(
                "OpenAI API error ({}): {}",
                status, error_text
            )));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            RetrievalError::embedding(format!("Failed to parse OpenAI response: {}", e))
        })?;

        order_by_index(body.data)
    }
}

/// Dimensions by model name.
fn dimensions_for_model(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
        _ => 1536,
    }
}

/// The API tags each vector with its input position; don't trust response order.
///
/// The indices must be exactly `0..n`; a gap or duplicate would pair a vector
/// with the wrong record.
fn order_by_index(mut data: Vec<EmbeddingData>) -> Result<Vec<Embedding>> {
    data.sort_by_key(|d| d.index);
    if let Some((position, bad)) = data.iter().enumerate().find(|(i, d)| d.index != *i) {
        return Err(RetrievalError::embedding(format!(
            "OpenAI response index {} at position {}; indices must cover 0..{}",
            bad.index,
            position,
            data.len()
        )));
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // One request per batch; the rule base is far below the API's input limit.
        self.call_api(texts).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
