//! Query service: the public read path.
//!
//! Embeds the query text, searches whatever generation is live at that
//! moment and returns plain `{id, title, description}` hits. Distances stay
//! internal.

use crate::config::DEFAULT_TOP_K;
use crate::embeddings::EmbeddingProvider;
use crate::index::{IndexManager, RebuildReport};
use crate::timeout::{bounded, EMBED};
use crate::types::{Result, RuleHit};
use std::sync::Arc;
use std::time::Duration;

/// Text shown when a search ran fine but matched nothing.
pub const NO_MATCHES: &str = "no rules found for this query";

/// Answers free-text queries against the live index generation.
#[derive(Clone)]
pub struct QueryService {
    index: Arc<IndexManager>,
    embedder: Arc<dyn EmbeddingProvider>,
    call_timeout: Duration,
    default_top_k: usize,
}

impl QueryService {
    /// Query service sharing `index`'s embedder and timeout.
    pub fn new(index: Arc<IndexManager>) -> Self {
        let embedder = index.embedder();
        let call_timeout = index.call_timeout();
        Self {
            index,
            embedder,
            call_timeout,
            default_top_k: DEFAULT_TOP_K,
        }
    }

    /// Override the result count used by [`QueryService::query_default`].
    pub fn with_default_top_k(mut self, k: usize) -> Self {
        self.default_top_k = k;
        self
    }

    /// Top `k` rules for `text`, most similar first.
    ///
    /// Returns an empty list when no generation is live, the live generation
    /// is empty, or `k == 0`.
    ///
    /// # Errors
    ///
    /// * `RetrievalError::Embedding` if the text cannot be embedded; this is
    ///   never reported as an empty result
    /// * `RetrievalError::Timeout` if the provider does not answer in time
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<RuleHit>> {
        let vector = bounded(EMBED, self.call_timeout, self.embedder.embed(text)).await?;

        // pin one generation for the whole search
        let Some(generation) = self.index.current() else {
            tracing::debug!("query before any index generation is live");
            return Ok(Vec::new());
        };

        let hits: Vec<RuleHit> = generation
            .search(&vector, k)?
            .into_iter()
            .map(|hit| RuleHit::from(hit.record))
            .collect();

        tracing::debug!(k, returned = hits.len(), entries = generation.len(), "query served");
        Ok(hits)
    }

    /// [`QueryService::query`] with the default result count.
    pub async fn query_default(&self, text: &str) -> Result<Vec<RuleHit>> {
        self.query(text, self.default_top_k).await
    }

    /// Rebuild the index from the store (public surface next to `query`).
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        self.index.rebuild().await
    }
}

/// Map a signed result count from an outer interface to `usize`.
///
/// Zero and negative counts mean "no results".
pub fn top_k_from_signed(k: i64) -> usize {
    usize::try_from(k).unwrap_or(0)
}

/// Human-readable rendering of query results.
pub fn render_hits(hits: &[RuleHit]) -> String {
    if hits.is_empty() {
        return NO_MATCHES.to_string();
    }

    hits.iter()
        .enumerate()
        .map(|(rank, hit)| format!("{}. [{}] {}\n   {}", rank + 1, hit.id, hit.title, hit.description))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::index::SnapshotStore;
    use crate::storage::{MemoryRuleStore, RuleStore};
    use crate::types::{Embedding, RetrievalError};
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingProvider for DownEmbedder {
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Embedding>> {
            Err(RetrievalError::embedding("provider unavailable"))
        }

        fn dimensions(&self) -> usize {
            8
        }

        fn model_name(&self) -> &str {
            "down"
        }
    }

    fn service(store: Arc<dyn RuleStore>, embedder: Arc<dyn EmbeddingProvider>, dir: &std::path::Path) -> QueryService {
        let manager = IndexManager::new(store, embedder, SnapshotStore::new(dir), Duration::from_secs(5));
        QueryService::new(Arc::new(manager))
    }

    #[tokio::test]
    async fn test_query_before_startup_is_empty() {
        let dir = tempdir().unwrap();
        let service = service(
            Arc::new(MemoryRuleStore::with_rules([("A", "a")])),
            Arc::new(HashingEmbedder::new(16).unwrap()),
            dir.path(),
        );

        assert!(service.query("a", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_ranks_matching_rule_first() {
        let dir = tempdir().unwrap();
        let service = service(
            Arc::new(MemoryRuleStore::with_rules([
                ("Pensão alimentícia", "Obrigação de prestar alimentos aos filhos"),
                ("Usucapião extraordinária", "Aquisição da propriedade pela posse"),
                ("Divórcio", "Dissolução do casamento"),
            ])),
            Arc::new(HashingEmbedder::new(384).unwrap()),
            dir.path(),
        );
        service.rebuild().await.unwrap();

        let hits = service.query_default("usucapião da propriedade").await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, 2);
    }

    #[tokio::test]
    async fn test_k_limits_results() {
        let dir = tempdir().unwrap();
        let service = service(
            Arc::new(MemoryRuleStore::with_rules([("A", "a"), ("B", "b"), ("C", "c")])),
            Arc::new(HashingEmbedder::new(16).unwrap()),
            dir.path(),
        );
        service.rebuild().await.unwrap();

        assert_eq!(service.query("a", 1).await.unwrap().len(), 1);
        assert!(service.query("a", 0).await.unwrap().is_empty());
        assert_eq!(service.query("a", 10).await.unwrap().len(), 3);
        assert_eq!(service.clone().with_default_top_k(2).query_default("a").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_not_empty_result() {
        let dir = tempdir().unwrap();
        let service = service(Arc::new(MemoryRuleStore::new()), Arc::new(DownEmbedder), dir.path());

        let err = service.query("usucapião", 3).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Embedding(_)));
    }

    #[test]
    fn test_top_k_from_signed() {
        assert_eq!(top_k_from_signed(3), 3);
        assert_eq!(top_k_from_signed(0), 0);
        assert_eq!(top_k_from_signed(-4), 0);
    }

    #[test]
    fn test_render_hits() {
        assert_eq!(render_hits(&[]), NO_MATCHES);

        let hits = vec![RuleHit {
            id: 9,
            title: "Usucapião".into(),
            description: "Posse prolongada".into(),
        }];
        assert_eq!(render_hits(&hits), "1. [9] Usucapião\n   Posse prolongada");
    }
}
