//! Durable rule store using RocksDB.
//!
//! Records live in `CF_RULES` as JSON values under big-endian id keys; the
//! next id lives in `CF_META`. An insert writes the record and the bumped
//! counter in one `WriteBatch`, so a crash never hands out an id twice.
//! RocksDB calls block, so every operation runs on the blocking pool.

use super::column_families::{all_column_families, CF_META, CF_RULES};
use super::keys::{decode_counter, decode_rule_key, encode_counter, encode_rule_key, NEXT_ID_KEY};
use super::{validate_rule, RuleStore};
use crate::otel::{db_span, DbOperation};
use crate::types::{Result, RetrievalError, RuleRecord};
use async_trait::async_trait;
use rocksdb::{BoundColumnFamily, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Stored value: the record minus its id, which is the key.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRule {
    title: String,
    description: String,
}

/// RocksDB-backed rule store.
///
/// Cheap to clone; clones share the database handle.
#[derive(Clone)]
pub struct RocksRuleStore {
    db: Arc<DB>,
    insert_lock: Arc<Mutex<()>>,
}

impl RocksRuleStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns `RetrievalError::Storage` if RocksDB fails to open
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let store = RocksRuleStore::open("~/.rules/rules")?;
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path, all_column_families())?;

        Ok(Self {
            db: Arc::new(db),
            insert_lock: Arc::new(Mutex::new(())),
        })
    }

    fn scan(db: &DB) -> Result<Vec<RuleRecord>> {
        let _span = db_span(DbOperation::Scan, "rocksdb", CF_RULES).entered();
        let cf = cf_handle(db, CF_RULES)?;

        let mut records = Vec::new();
        for item in db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item?;
            let id = decode_rule_key(&key)?;
            let stored: StoredRule = serde_json::from_slice(&value)?;
            records.push(RuleRecord {
                id,
                title: stored.title,
                description: stored.description,
            });
        }
        Ok(records)
    }

    fn write(db: &DB, lock: &Mutex<()>, title: String, description: String) -> Result<RuleRecord> {
        let _span = db_span(DbOperation::BatchWrite, "rocksdb", CF_RULES).entered();
        let _guard = lock
            .lock()
            .map_err(|e| RetrievalError::store(format!("Lock error: {}", e)))?;

        let rules = cf_handle(db, CF_RULES)?;
        let meta = cf_handle(db, CF_META)?;

        let id = match db.get_cf(&meta, NEXT_ID_KEY)? {
            Some(bytes) => decode_counter(&bytes)?,
            None => 1,
        };

        let value = serde_json::to_vec(&StoredRule {
            title: title.clone(),
            description: description.clone(),
        })?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&rules, encode_rule_key(id), value);
        batch.put_cf(&meta, NEXT_ID_KEY, encode_counter(id + 1));
        db.write(batch)?;

        Ok(RuleRecord {
            id,
            title,
            description,
        })
    }
}

fn cf_handle<'a>(db: &'a DB, name: &str) -> Result<Arc<BoundColumnFamily<'a>>> {
    db.cf_handle(name)
        .ok_or_else(|| RetrievalError::store(format!("Column family '{}' not found", name)))
}

fn join_error(e: tokio::task::JoinError) -> RetrievalError {
    RetrievalError::Internal(format!("blocking store task failed: {}", e))
}

#[async_trait]
impl RuleStore for RocksRuleStore {
    async fn list_all(&self) -> Result<Vec<RuleRecord>> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || Self::scan(&db))
            .await
            .map_err(join_error)?
    }

    async fn insert(&self, title: &str, description: &str) -> Result<RuleRecord> {
        validate_rule(title, description)?;

        let db = Arc::clone(&self.db);
        let lock = Arc::clone(&self.insert_lock);
        let title = title.to_string();
        let description = description.to_string();

        tokio::task::spawn_blocking(move || Self::write(&db, &lock, title, description))
            .await
            .map_err(join_error)?
    }
}
