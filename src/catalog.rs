//! Insert path and index notifications.
//!
//! `RuleCatalog` is what outer layers (CLI, webhook handlers) call to add a
//! rule. It writes to the store and then sends an explicit `IndexEvent`; the
//! `RebuildWorker` on the other end of the channel turns events into index
//! rebuilds. The index never polls the store and is never rebuilt inline by
//! unrelated code.

use crate::index::{IndexManager, RebuildReport};
use crate::storage::{validate_rule, RuleStore};
use crate::timeout::{bounded, STORE_INSERT};
use crate::types::{Result, RuleRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Notification sent to the rebuild worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEvent {
    /// A rule was stored and must become searchable
    RuleInserted(RuleRecord),
    /// Operator asked for a rebuild
    RebuildRequested,
}

/// Front door for writes.
#[derive(Clone)]
pub struct RuleCatalog {
    store: Arc<dyn RuleStore>,
    events: mpsc::UnboundedSender<IndexEvent>,
    call_timeout: Duration,
}

impl RuleCatalog {
    /// Catalog writing to `store` and its worker rebuilding `index`.
    ///
    /// The worker is returned unstarted; call [`RebuildWorker::spawn`].
    pub fn new(store: Arc<dyn RuleStore>, index: Arc<IndexManager>) -> (Self, RebuildWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let call_timeout = index.call_timeout();
        let catalog = Self {
            store,
            events: tx,
            call_timeout,
        };
        let worker = RebuildWorker { index, events: rx };
        (catalog, worker)
    }

    /// Store a rule and schedule the rebuild that makes it searchable.
    ///
    /// Returns once the record is durable; the rebuild happens on the worker.
    ///
    /// # Errors
    ///
    /// * `RetrievalError::Validation` for a blank title or description
    /// * store errors and `RetrievalError::Timeout` from the insert
    pub async fn add_rule(&self, title: &str, description: &str) -> Result<RuleRecord> {
        validate_rule(title, description)?;

        let record = bounded(STORE_INSERT, self.call_timeout, self.store.insert(title, description)).await?;
        tracing::info!(rule_id = record.id, title = %record.title, "rule stored");

        if self.events.send(IndexEvent::RuleInserted(record.clone())).is_err() {
            tracing::warn!(rule_id = record.id, "rebuild worker gone; rule not indexed until next rebuild");
        }
        Ok(record)
    }

    /// Ask the worker for a rebuild without inserting anything.
    pub fn request_rebuild(&self) {
        if self.events.send(IndexEvent::RebuildRequested).is_err() {
            tracing::warn!("rebuild worker gone; rebuild request dropped");
        }
    }
}

/// Consumes `IndexEvent`s and rebuilds the index.
pub struct RebuildWorker {
    index: Arc<IndexManager>,
    events: mpsc::UnboundedReceiver<IndexEvent>,
}

impl RebuildWorker {
    /// Run on the tokio runtime until every `RuleCatalog` clone is dropped.
    ///
    /// The handle resolves to the outcome of [`RebuildWorker::run`].
    pub fn spawn(self) -> JoinHandle<Result<Option<RebuildReport>>> {
        tokio::spawn(self.run())
    }

    /// Process events until the channel closes.
    ///
    /// Events that queue up while a rebuild runs are drained together and
    /// served by one rebuild; it starts after all of their inserts, so every
    /// drained record is captured.
    ///
    /// Returns the report of the last rebuild, or `None` if no event arrived.
    /// Each rebuild covers the whole store, so the last outcome decides
    /// whether every inserted rule is searchable.
    ///
    /// # Errors
    ///
    /// The error of the last rebuild, if it failed
    pub async fn run(mut self) -> Result<Option<RebuildReport>> {
        let mut last = Ok(None);

        while let Some(first) = self.events.recv().await {
            let mut batch = vec![first];
            while let Ok(next) = self.events.try_recv() {
                batch.push(next);
            }

            last = match self.process(&batch).await {
                Ok(report) => {
                    tracing::info!(
                        events = batch.len(),
                        entries = report.entries,
                        persisted = report.persisted,
                        "index rebuilt"
                    );
                    Ok(Some(report))
                }
                Err(e) => {
                    if e.is_recoverable() {
                        tracing::warn!(events = batch.len(), error = %e, "index rebuild failed; next event retries");
                    } else {
                        tracing::error!(events = batch.len(), error = %e, "index rebuild failed");
                    }
                    Err(e)
                }
            };
        }

        tracing::debug!("rebuild worker stopped");
        last
    }

    async fn process(&self, batch: &[IndexEvent]) -> Result<RebuildReport> {
        let last_insert = batch.iter().rev().find_map(|event| match event {
            IndexEvent::RuleInserted(record) => Some(record),
            IndexEvent::RebuildRequested => None,
        });

        match last_insert {
            Some(record) => self.index.notify_inserted(record).await,
            None => self.index.rebuild().await,
        }
    }
}
