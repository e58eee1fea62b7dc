//! Rule store operation instrumentation.

use tracing::{span, Level, Span};

/// Store operation types (maps to `db.operation.name`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbOperation {
    /// Full ordered scan of the rule collection
    Scan,
    /// Atomic id allocation + record write
    BatchWrite,
}

impl DbOperation {
    /// Get operation name as string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::BatchWrite => "batch_write",
        }
    }
}

/// Create store operation span.
///
/// # Arguments
///
/// * `operation` - Store operation type
/// * `system` - Backend name (`rocksdb`, `memory`)
/// * `collection` - Collection name
pub fn db_span(operation: DbOperation, system: &'static str, collection: &str) -> Span {
    span!(
        Level::DEBUG,
        "db",
        otel.name = format!("{} {}", operation.as_str(), collection),
        otel.kind = "client",
        db.system.name = system,
        db.operation.name = operation.as_str(),
        db.collection.name = collection,
    )
}
