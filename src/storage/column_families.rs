//! Column family constants for the RocksDB rule store.

/// Rule records, keyed by big-endian id
pub const CF_RULES: &str = "rules";

/// Store bookkeeping (id counter)
pub const CF_META: &str = "meta";

/// Get all column family names.
pub fn all_column_families() -> Vec<&'static str> {
    vec![CF_RULES, CF_META]
}
