//! Shared stubs for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use rule_index::types::{Embedding, Result, RetrievalError, RuleRecord};
use rule_index::{EmbeddingProvider, MemoryRuleStore, RuleStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Deterministic embedder: each text maps to `blake3(text)` spread over
/// `dimensions` floats in [-1, 1]. Counts calls, can be slowed or failed.
pub struct StubEmbedder {
    dimensions: usize,
    delay: Option<Duration>,
    failing: AtomicBool,
    batch_calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            delay: None,
            failing: AtomicBool::new(false),
            batch_calls: AtomicUsize::new(0),
        }
    }

    /// Sleep `delay` in batches of more than one text (index builds); single
    /// query embeds stay fast.
    pub fn slow_builds(dimensions: usize, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(dimensions)
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(&self, text: &str) -> Embedding {
        let mut hasher = blake3::Hasher::new();
        hasher.update(text.as_bytes());
        let mut reader = hasher.finalize_xof();

        let mut bytes = vec![0u8; self.dimensions];
        reader.fill(&mut bytes);
        bytes.into_iter().map(|b| b as f64 / 127.5 - 1.0).collect()
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay.filter(|_| texts.len() > 1) {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(RetrievalError::embedding("stub provider down"));
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

/// Store that is always unreachable.
pub struct FailingStore;

#[async_trait]
impl RuleStore for FailingStore {
    async fn list_all(&self) -> Result<Vec<RuleRecord>> {
        Err(RetrievalError::store("connection refused"))
    }

    async fn insert(&self, _title: &str, _description: &str) -> Result<RuleRecord> {
        Err(RetrievalError::store("connection refused"))
    }
}

/// Memory store whose reads can be switched off.
pub struct FlakyStore {
    inner: MemoryRuleStore,
    down: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: MemoryRuleStore) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl RuleStore for FlakyStore {
    async fn list_all(&self) -> Result<Vec<RuleRecord>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(RetrievalError::store("connection reset"));
        }
        self.inner.list_all().await
    }

    async fn insert(&self, title: &str, description: &str) -> Result<RuleRecord> {
        self.inner.insert(title, description).await
    }
}

/// Five distinct rules used across tests.
pub fn sample_rules() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Usucapião Extraordinária", "Aquisição da propriedade pela posse ininterrupta por quinze anos"),
        ("Pensão Alimentícia", "Obrigação de prestar alimentos aos filhos menores"),
        ("Divórcio Consensual", "Dissolução do casamento por acordo entre os cônjuges"),
        ("Prescrição Aquisitiva", "Perda da pretensão pelo decurso do prazo legal"),
        ("Responsabilidade Civil", "Dever de reparar o dano causado a outrem"),
    ]
}
