//! Rule Index - semantic retrieval over legal rule records
//!
//! Embedding-based nearest-neighbour search over a small, slowly growing
//! collection of `{id, title, description}` rules:
//! - Flat exact k-NN index (squared L2) over one immutable generation
//! - Snapshot persistence so restarts skip re-embedding
//! - Explicit insert notifications driving full rebuilds
//! - Lock-free swap of generations under concurrent queries

pub mod catalog;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod otel;
pub mod query;
pub mod storage;
pub mod timeout;
pub mod types;

pub use catalog::{IndexEvent, RebuildWorker, RuleCatalog};
pub use config::RetrievalConfig;
pub use embeddings::EmbeddingProvider;
pub use index::{IndexManager, IndexStatus, LifecycleState, RebuildReport, SnapshotStore, StartupOutcome};
pub use query::QueryService;
pub use storage::{MemoryRuleStore, RocksRuleStore, RuleStore};
pub use types::{Embedding, Result, RetrievalError, RuleHit, RuleRecord};
