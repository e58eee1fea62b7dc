//! In-process rule store.

use super::{validate_rule, RuleStore};
use crate::otel::{db_span, DbOperation};
use crate::types::{Result, RetrievalError, RuleRecord};
use async_trait::async_trait;
use std::sync::{PoisonError, RwLock};

/// Rule store held in memory. Ids start at 1 and increase by one.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    records: RwLock<Vec<RuleRecord>>,
}

impl MemoryRuleStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `(title, description)` pairs, ids 1..=n.
    pub fn with_rules<I, T, D>(rules: I) -> Self
    where
        I: IntoIterator<Item = (T, D)>,
        T: Into<String>,
        D: Into<String>,
    {
        let records = rules
            .into_iter()
            .enumerate()
            .map(|(i, (title, description))| RuleRecord::new(i as i64 + 1, title, description))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Number of stored rules.
    ///
    /// Counts through a poisoned lock: a panicking writer never leaves a
    /// partial record behind (push is the last step), so the count is exact.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> RetrievalError {
    RetrievalError::store(format!("Lock error: {}", e))
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn list_all(&self) -> Result<Vec<RuleRecord>> {
        let _span = db_span(DbOperation::Scan, "memory", "rules").entered();
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.clone())
    }

    async fn insert(&self, title: &str, description: &str) -> Result<RuleRecord> {
        validate_rule(title, description)?;

        let _span = db_span(DbOperation::BatchWrite, "memory", "rules").entered();
        let mut records = self.records.write().map_err(poisoned)?;
        let id = records.last().map_or(1, |r| r.id + 1);
        let record = RuleRecord::new(id, title, description);
        records.push(record.clone());
        Ok(record)
    }
}
