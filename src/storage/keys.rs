//! Key encoding and decoding for the RocksDB rule store.
//!
//! Rule keys are the id as 8 big-endian bytes, so RocksDB's lexicographic
//! iteration order is ascending id order. Ids are always positive.

use crate::types::{Result, RetrievalError};

/// Key in `CF_META` holding the next id to hand out.
pub const NEXT_ID_KEY: &[u8] = b"next_rule_id";

/// Encode rule key.
pub fn encode_rule_key(id: i64) -> [u8; 8] {
    id.to_be_bytes()
}

/// Decode rule key.
///
/// # Errors
///
/// Returns `RetrievalError::StoreUnavailable` if the key is not 8 bytes
pub fn decode_rule_key(key: &[u8]) -> Result<i64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| RetrievalError::store(format!("invalid rule key length {}", key.len())))?;
    Ok(i64::from_be_bytes(bytes))
}

/// Encode the id counter value.
pub fn encode_counter(value: i64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Decode the id counter value.
pub fn decode_counter(bytes: &[u8]) -> Result<i64> {
    decode_rule_key(bytes)
}
