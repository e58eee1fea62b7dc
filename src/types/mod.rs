//! Core data types for the rule index.
//!
//! - `RuleRecord`: one stored legal rule (id, title, description)
//! - `RuleHit`: the caller-facing shape of a search match
//! - `RetrievalError`: error taxonomy for all operations
//! - `Result`: convenient result type alias

pub mod error;
pub mod record;
pub mod result;

pub use error::RetrievalError;
pub use record::{Embedding, RuleHit, RuleRecord};
pub use result::Result;
