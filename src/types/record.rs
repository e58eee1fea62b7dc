//! Rule record data structures.
//!
//! `RuleRecord` is the single record shape used at every boundary: the rule
//! store produces it, the index keeps a read-only copy of it, and the query
//! service projects it into `RuleHit`.

use serde::{Deserialize, Serialize};

/// Dense embedding vector.
pub type Embedding = Vec<f64>;

/// One stored legal rule.
///
/// `id` is assigned once by the rule store. Records are never updated or
/// deleted, so a copy taken at build time stays valid for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    /// Store-assigned identifier
    pub id: i64,

    /// Short rule title
    pub title: String,

    /// Full rule text
    pub description: String,
}

impl RuleRecord {
    /// Create a new record.
    pub fn new(id: i64, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
        }
    }

    /// Text fed to the embedding provider: title and description joined by a space.
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// Search match returned to callers.
///
/// Distance is internal ranking data and is deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleHit {
    pub id: i64,
    pub title: String,
    pub description: String,
}

impl From<&RuleRecord> for RuleHit {
    fn from(record: &RuleRecord) -> Self {
        Self {
            id: record.id,
            title: record.title.clone(),
            description: record.description.clone(),
        }
    }
}
