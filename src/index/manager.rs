//! Index lifecycle: build, persist, restore, rebuild, swap.
//!
//! # Lifecycle
//!
//! 1. Startup: `IndexManager::startup` restores the snapshot if it is present
//!    and valid, otherwise rebuilds from the rule store.
//! 2. Steady state: queries load the live generation without locking.
//! 3. Insert: the catalog notifies the manager, which runs a full rebuild.
//! 4. Replacement: a rebuild publishes a whole new generation in one atomic
//!    store; generations held by in-flight queries stay alive until dropped.
//!
//! # Concurrency & ordering
//!
//! * Readers are wait-free (`ArcSwapOption` load + immutable data reads).
//! * Rebuilds are serialized by an async mutex; readers never touch it.
//! * A query racing a rebuild sees the fully old or fully new generation.
//!
//! # Failure modes & recovery
//!
//! * Store or embedding failure during a rebuild leaves the previous
//!   generation live and returns the error to the caller.
//! * A corrupt snapshot at startup is logged and replaced by a rebuild.
//! * A snapshot write failure after a successful build is logged and the
//!   previous snapshot is removed, so the next startup rebuilds instead of
//!   restoring stale data. The new generation stays live and
//!   `RebuildReport::persisted` is `false`.

use crate::embeddings::EmbeddingProvider;
use crate::index::flat::{GenerationInfo, IndexGeneration};
use crate::index::snapshot::SnapshotStore;
use crate::otel::{background_span, record_background_metrics, BackgroundJobType};
use crate::storage::RuleStore;
use crate::timeout::{bounded, EMBED, STORE_FETCH};
use crate::types::{Result, RetrievalError, RuleRecord};
use arc_swap::ArcSwapOption;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::Instrument;

/// Lifecycle state of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No generation built or restored yet
    Empty,
    /// A generation is live
    Loaded,
    /// A new generation is under construction
    Rebuilding,
}

/// How `startup` obtained its first generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    /// Snapshot restored without calling the embedding provider
    Restored { entries: usize },
    /// Snapshot absent or invalid; rebuilt from the rule store
    Rebuilt { entries: usize },
}

/// Result of a successful rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildReport {
    pub entries: usize,
    /// `false` if the snapshot could not be written
    pub persisted: bool,
}

/// Point-in-time view for status output.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub state: LifecycleState,
    pub generation: Option<GenerationInfo>,
    pub model: String,
}

/// Owns the live index generation and everything needed to rebuild it.
pub struct IndexManager {
    store: Arc<dyn RuleStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    snapshots: SnapshotStore,
    call_timeout: Duration,
    live: ArcSwapOption<IndexGeneration>,
    rebuild_lock: Mutex<()>,
    rebuilding: AtomicBool,
}

/// Clears the rebuilding flag however the rebuild ends.
struct RebuildingGuard<'a>(&'a AtomicBool);

impl<'a> RebuildingGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for RebuildingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl IndexManager {
    /// Create a manager in the `Empty` state.
    ///
    /// # Arguments
    ///
    /// * `store` - Authoritative rule store
    /// * `embedder` - Provider used for builds
    /// * `snapshots` - Snapshot location
    /// * `call_timeout` - Bound for each store fetch and embedding call
    pub fn new(
        store: Arc<dyn RuleStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        snapshots: SnapshotStore,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            embedder,
            snapshots,
            call_timeout,
            live: ArcSwapOption::empty(),
            rebuild_lock: Mutex::new(()),
            rebuilding: AtomicBool::new(false),
        }
    }

    /// Restore the snapshot, or rebuild if there is no usable one.
    ///
    /// # Errors
    ///
    /// Only rebuild errors are returned; snapshot problems trigger the rebuild
    pub async fn startup(&self) -> Result<StartupOutcome> {
        if let Some(entries) = self.restore().await {
            return Ok(StartupOutcome::Restored { entries });
        }

        let report = self.rebuild().await?;
        Ok(StartupOutcome::Rebuilt {
            entries: report.entries,
        })
    }

    /// Publish the persisted snapshot if there is a usable one.
    ///
    /// Never calls the embedding provider or the store. Returns the restored
    /// entry count, or `None` (logged) if the snapshot is absent, corrupt, or
    /// was built with a different embedding dimension than the embedder's.
    pub async fn restore(&self) -> Option<usize> {
        match self.load_snapshot().await {
            Ok(Some(generation)) if self.fits_embedder(&generation) => {
                let entries = generation.len();
                self.live.store(Some(Arc::new(generation)));
                tracing::info!(entries, dir = %self.snapshots.dir().display(), "restored index snapshot");
                Some(entries)
            }
            Ok(Some(generation)) => {
                tracing::warn!(
                    snapshot_dimensions = generation.dimensions(),
                    embedder_dimensions = self.embedder.dimensions(),
                    "snapshot built with a different embedding dimension; needs rebuild"
                );
                None
            }
            Ok(None) => {
                tracing::info!(dir = %self.snapshots.dir().display(), "no index snapshot");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "index snapshot unusable; needs rebuild");
                None
            }
        }
    }

    fn fits_embedder(&self, generation: &IndexGeneration) -> bool {
        generation.is_empty() || generation.dimensions() == self.embedder.dimensions()
    }

    async fn load_snapshot(&self) -> Result<Option<IndexGeneration>> {
        let snapshots = self.snapshots.clone();
        let span = background_span(BackgroundJobType::IndexLoad, &snapshots.dir().display().to_string());
        let started = Instant::now();

        let result = tokio::task::spawn_blocking(move || snapshots.load())
            .await
            .map_err(|e| RetrievalError::corrupt(format!("snapshot load task failed: {}", e)))?;

        let status = if result.is_ok() { "success" } else { "failed" };
        let entries = result.as_ref().ok().and_then(|g| g.as_ref().map(IndexGeneration::len));
        record_background_metrics(&span, entries, Some(started.elapsed().as_millis() as u64), status);
        result
    }

    /// Build a new generation from the full rule store and make it live.
    ///
    /// Concurrent calls run one after another. On failure the previously live
    /// generation (if any) stays live.
    ///
    /// # Errors
    ///
    /// * `RetrievalError::StoreUnavailable` if the store cannot be read
    /// * `RetrievalError::Embedding` if the provider fails
    /// * `RetrievalError::Timeout` if either call exceeds the bound
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        let _serial = self.rebuild_lock.lock().await;
        let _flag = RebuildingGuard::set(&self.rebuilding);

        let span = background_span(BackgroundJobType::IndexBuild, self.embedder.model_name());
        let started = Instant::now();

        let built = self.build_generation().instrument(span.clone()).await;
        let elapsed = started.elapsed().as_millis() as u64;

        let generation = match built {
            Ok(generation) => {
                record_background_metrics(&span, Some(generation.len()), Some(elapsed), "success");
                Arc::new(generation)
            }
            Err(e) => {
                record_background_metrics(&span, None, Some(elapsed), "failed");
                tracing::error!(error = %e, "index rebuild failed; keeping previous generation");
                return Err(e);
            }
        };

        let entries = generation.len();
        self.live.store(Some(Arc::clone(&generation)));
        tracing::info!(entries, elapsed_ms = elapsed, "published new index generation");

        let persisted = match self.persist(generation).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "failed to write index snapshot");
                self.discard_stale_snapshot().await;
                false
            }
        };

        Ok(RebuildReport { entries, persisted })
    }

    async fn build_generation(&self) -> Result<IndexGeneration> {
        let records = bounded(STORE_FETCH, self.call_timeout, self.store.list_all())
            .await
            .map_err(as_store_error)?;
        tracing::debug!(records = records.len(), "fetched rule store snapshot");

        let embedder = self.embedder.as_ref();
        bounded(EMBED, self.call_timeout, IndexGeneration::build(records, embedder)).await
    }

    async fn persist(&self, generation: Arc<IndexGeneration>) -> Result<()> {
        let snapshots = self.snapshots.clone();
        let span = background_span(BackgroundJobType::IndexSave, &snapshots.dir().display().to_string());
        let started = Instant::now();
        let entries = generation.len();

        let result = tokio::task::spawn_blocking(move || snapshots.save(&generation))
            .await
            .map_err(|e| RetrievalError::Internal(format!("snapshot save task failed: {}", e)))?;

        let status = if result.is_ok() { "success" } else { "failed" };
        record_background_metrics(&span, Some(entries), Some(started.elapsed().as_millis() as u64), status);
        result
    }

    /// Remove the previous snapshot after a failed write.
    ///
    /// It no longer matches the store, and a later `startup` would restore it
    /// instead of rebuilding.
    async fn discard_stale_snapshot(&self) {
        let snapshots = self.snapshots.clone();
        let cleared = tokio::task::spawn_blocking(move || snapshots.clear())
            .await
            .map_err(|e| RetrievalError::Internal(format!("snapshot clear task failed: {}", e)))
            .and_then(|r| r);

        match cleared {
            Ok(()) => tracing::info!(dir = %self.snapshots.dir().display(), "removed stale index snapshot"),
            Err(e) => tracing::error!(error = %e, "stale index snapshot could not be removed"),
        }
    }

    /// React to a rule inserted elsewhere.
    ///
    /// Policy is a full rebuild, so every insert costs one embedding call per
    /// stored rule.
    pub async fn notify_inserted(&self, record: &RuleRecord) -> Result<RebuildReport> {
        tracing::info!(rule_id = record.id, "rule inserted; rebuilding index");
        self.rebuild().await
    }

    /// Live generation, if any. Holding the `Arc` pins that generation.
    pub fn current(&self) -> Option<Arc<IndexGeneration>> {
        self.live.load_full()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        if self.rebuilding.load(Ordering::Acquire) {
            LifecycleState::Rebuilding
        } else if self.live.load().is_some() {
            LifecycleState::Loaded
        } else {
            LifecycleState::Empty
        }
    }

    /// State plus live generation info.
    pub fn status(&self) -> IndexStatus {
        IndexStatus {
            state: self.state(),
            generation: self.current().map(|g| g.info()),
            model: self.embedder.model_name().to_string(),
        }
    }

    /// Embedding provider used for builds.
    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::clone(&self.embedder)
    }

    /// Configured bound on external calls.
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }
}

/// Any failure reading the store during a rebuild is reported as the store
/// being unavailable; timeouts keep their own kind.
fn as_store_error(e: RetrievalError) -> RetrievalError {
    match e {
        RetrievalError::StoreUnavailable(_) | RetrievalError::Timeout { .. } => e,
        other => RetrievalError::store(other.to_string()),
    }
}
