//! End-to-end tests for insert, rebuild and query.

mod common;

use common::{sample_rules, FailingStore, FlakyStore, StubEmbedder};
use rule_index::embeddings::HashingEmbedder;
use rule_index::{
    IndexManager, LifecycleState, MemoryRuleStore, QueryService, RetrievalError, RocksRuleStore,
    RuleCatalog, RuleStore, SnapshotStore, StartupOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_inserted_rule_found_by_its_title() {
    let dir = tempdir().unwrap();
    let store = Arc::new(RocksRuleStore::open(dir.path().join("rules")).unwrap());
    let index = Arc::new(IndexManager::new(
        store.clone(),
        Arc::new(HashingEmbedder::new(384).unwrap()),
        SnapshotStore::new(dir.path().join("index")),
        TIMEOUT,
    ));
    assert_eq!(index.startup().await.unwrap(), StartupOutcome::Rebuilt { entries: 0 });

    let (catalog, worker) = RuleCatalog::new(store.clone(), index.clone());
    let handle = worker.spawn();

    let mut usucapiao = None;
    for (title, description) in sample_rules() {
        let record = catalog.add_rule(title, description).await.unwrap();
        if title == "Usucapião Extraordinária" {
            usucapiao = Some(record.id);
        }
    }
    drop(catalog);
    let report = handle.await.unwrap().unwrap().unwrap();
    assert_eq!(report.entries, 5);

    let service = QueryService::new(index.clone());
    let hits = service.query("Usucapião Extraordinária", 3).await.unwrap();
    assert!(hits.len() <= 3);
    assert!(hits.iter().any(|hit| Some(hit.id) == usucapiao));
}

#[tokio::test]
async fn test_rebuild_without_insert_is_idempotent() {
    let dir = tempdir().unwrap();
    let embedder = Arc::new(StubEmbedder::new(24));
    let index = Arc::new(IndexManager::new(
        Arc::new(MemoryRuleStore::with_rules(sample_rules())),
        embedder,
        SnapshotStore::new(dir.path()),
        TIMEOUT,
    ));
    let service = QueryService::new(index.clone());

    index.rebuild().await.unwrap();
    let first = service.query("posse da propriedade", 5).await.unwrap();

    index.rebuild().await.unwrap();
    let second = service.query("posse da propriedade", 5).await.unwrap();

    assert_eq!(first.len(), 5);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_store_outage_keeps_previous_generation() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FlakyStore::new(MemoryRuleStore::with_rules(sample_rules())));
    let index = Arc::new(IndexManager::new(
        store.clone(),
        Arc::new(StubEmbedder::new(16)),
        SnapshotStore::new(dir.path()),
        TIMEOUT,
    ));
    index.rebuild().await.unwrap();
    let live = index.current().unwrap();

    store.insert("Nova Regra", "Texto").await.unwrap();
    store.set_down(true);

    let err = index.rebuild().await.unwrap_err();
    assert!(matches!(err, RetrievalError::StoreUnavailable(_)));
    assert!(err.is_recoverable());
    assert!(Arc::ptr_eq(&live, &index.current().unwrap()));
    assert_eq!(index.state(), LifecycleState::Loaded);

    store.set_down(false);
    assert_eq!(index.rebuild().await.unwrap().entries, 6);
}

#[tokio::test]
async fn test_embedding_outage_keeps_previous_generation() {
    let dir = tempdir().unwrap();
    let embedder = Arc::new(StubEmbedder::new(16));
    let index = IndexManager::new(
        Arc::new(MemoryRuleStore::with_rules(sample_rules())),
        embedder.clone(),
        SnapshotStore::new(dir.path()),
        TIMEOUT,
    );
    index.rebuild().await.unwrap();

    embedder.set_failing(true);
    let err = index.rebuild().await.unwrap_err();
    assert!(matches!(err, RetrievalError::Embedding(_)));
    assert_eq!(index.current().unwrap().len(), 5);
}

#[tokio::test]
async fn test_unreachable_store_at_startup_is_an_error() {
    let dir = tempdir().unwrap();
    let index = IndexManager::new(
        Arc::new(FailingStore),
        Arc::new(StubEmbedder::new(8)),
        SnapshotStore::new(dir.path()),
        TIMEOUT,
    );

    let err = index.startup().await.unwrap_err();
    assert!(matches!(err, RetrievalError::StoreUnavailable(_)));
    assert!(index.current().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_slow_provider_times_out() {
    let dir = tempdir().unwrap();
    let index = IndexManager::new(
        Arc::new(MemoryRuleStore::with_rules(sample_rules())),
        Arc::new(StubEmbedder::slow_builds(8, Duration::from_secs(60))),
        SnapshotStore::new(dir.path()),
        Duration::from_secs(1),
    );

    let err = index.rebuild().await.unwrap_err();
    assert!(matches!(err, RetrievalError::Timeout { .. }));
    assert_eq!(index.state(), LifecycleState::Empty);
}

#[tokio::test]
async fn test_failed_rebuild_after_insert_reaches_the_caller() {
    let dir = tempdir().unwrap();
    let store = Arc::new(MemoryRuleStore::with_rules(sample_rules()));
    let embedder = Arc::new(StubEmbedder::new(16));
    let index = Arc::new(IndexManager::new(
        store.clone(),
        embedder.clone(),
        SnapshotStore::new(dir.path()),
        TIMEOUT,
    ));
    index.startup().await.unwrap();

    let (catalog, worker) = RuleCatalog::new(store.clone(), index.clone());
    let handle = worker.spawn();

    embedder.set_failing(true);
    let record = catalog.add_rule("Guarda Compartilhada", "Responsabilização conjunta").await.unwrap();
    drop(catalog);

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, RetrievalError::Embedding(_)));
    assert_eq!(store.len(), 6);
    assert!(!index.current().unwrap().records().contains(&record));
}

#[tokio::test]
async fn test_restore_skips_rebuild_before_insert() {
    let dir = tempdir().unwrap();
    let store = Arc::new(MemoryRuleStore::with_rules(sample_rules()));
    let embedder = Arc::new(StubEmbedder::new(16));
    let index = Arc::new(IndexManager::new(
        store.clone(),
        embedder.clone(),
        SnapshotStore::new(dir.path()),
        TIMEOUT,
    ));

    // cold start: nothing to restore, and nothing embedded yet
    assert_eq!(index.restore().await, None);
    assert_eq!(embedder.batch_calls(), 0);

    let (catalog, worker) = RuleCatalog::new(store, index.clone());
    let handle = worker.spawn();
    catalog.add_rule("Guarda Compartilhada", "Responsabilização conjunta").await.unwrap();
    drop(catalog);

    assert_eq!(handle.await.unwrap().unwrap().unwrap().entries, 6);
    assert_eq!(embedder.batch_calls(), 1);
}
