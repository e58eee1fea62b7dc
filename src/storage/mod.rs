//! Rule store boundary and implementations.
//!
//! The store is the authoritative copy of every rule. The index only reads it
//! (`list_all`) during a rebuild; inserts happen through the catalog, which
//! then notifies the index.
//!
//! - `RocksRuleStore`: durable, RocksDB column families
//! - `MemoryRuleStore`: in-process, for tests and throwaway runs

pub mod column_families;
pub mod keys;
mod memory;
mod rocks;

pub use memory::MemoryRuleStore;
pub use rocks::RocksRuleStore;

use crate::types::{Result, RetrievalError, RuleRecord};
use async_trait::async_trait;

/// Authoritative rule collection.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Every record, ascending by id. May be empty.
    async fn list_all(&self) -> Result<Vec<RuleRecord>>;

    /// Store a new rule and return it with its freshly assigned id.
    async fn insert(&self, title: &str, description: &str) -> Result<RuleRecord>;
}

/// Reject rules the store would refuse (both columns are NOT NULL text).
///
/// # Errors
///
/// Returns `RetrievalError::Validation` if either field is blank
pub fn validate_rule(title: &str, description: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(RetrievalError::validation("title must not be empty"));
    }
    if description.trim().is_empty() {
        return Err(RetrievalError::validation("description must not be empty"));
    }
    Ok(())
}
