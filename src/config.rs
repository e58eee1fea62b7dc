//! Retrieval configuration and data location management.
//!
//! Configuration comes from an optional JSON file, then environment
//! variables override individual fields:
//!
//! - `RULES_DATA_DIR`: root directory (store + snapshot), default `~/.rules`
//! - `RULES_EMBEDDING_MODEL`: local sentence model (default all-MiniLM-L6-v2),
//!   `hashing` (offline, no model download) or an OpenAI `text-embedding-*` model
//! - `RULES_EMBEDDING_DIMENSIONS`: vector size for the local model
//! - `RULES_CALL_TIMEOUT_MS`: bound on every store fetch and embedding call
//! - `RULES_DEFAULT_TOP_K`: result count when the caller gives none
//! - `OPENAI_API_KEY`: required for OpenAI models
//! - `OPENAI_BASE_URL`: OpenAI-compatible endpoint (proxy, gateway)

use crate::types::{Result, RetrievalError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default local sentence model, loaded through `embed_anything`.
pub const LOCAL_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Model name selecting the offline feature-hashing embedder.
pub const HASHING_MODEL: &str = "hashing";

/// Dimension of the sentence model the rule base was originally indexed with.
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Results returned when the caller does not ask for a count.
pub const DEFAULT_TOP_K: usize = 3;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Root data directory.
    pub data_dir: PathBuf,
    /// Embedding model name.
    pub embedding_model: String,
    /// Dimension for local models (OpenAI models fix their own).
    pub embedding_dimensions: usize,
    /// Timeout for store and embedding calls, in milliseconds.
    pub call_timeout_ms: u64,
    /// Default number of query results.
    pub default_top_k: usize,
    /// OpenAI API key. Never written back to disk.
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
    /// OpenAI-compatible endpoint; `None` uses the public API.
    pub openai_base_url: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.rules"),
            embedding_model: LOCAL_MODEL.to_string(),
            embedding_dimensions: DEFAULT_DIMENSIONS,
            call_timeout_ms: DEFAULT_TIMEOUT_MS,
            default_top_k: DEFAULT_TOP_K,
            openai_api_key: None,
            openai_base_url: None,
        }
    }
}

impl RetrievalConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `RetrievalError::Config` if the file is not valid configuration
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&content)
            .map_err(|e| RetrievalError::Config(format!("Invalid config: {}", e)))
    }

    /// Build configuration from an optional file plus the process environment.
    pub fn resolve(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `RetrievalError::Config` if a numeric variable does not parse
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("RULES_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(model) = lookup("RULES_EMBEDDING_MODEL") {
            self.embedding_model = model;
        }
        if let Some(dims) = lookup("RULES_EMBEDDING_DIMENSIONS") {
            self.embedding_dimensions = parse_var("RULES_EMBEDDING_DIMENSIONS", &dims)?;
        }
        if let Some(ms) = lookup("RULES_CALL_TIMEOUT_MS") {
            self.call_timeout_ms = parse_var("RULES_CALL_TIMEOUT_MS", &ms)?;
        }
        if let Some(k) = lookup("RULES_DEFAULT_TOP_K") {
            self.default_top_k = parse_var("RULES_DEFAULT_TOP_K", &k)?;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.openai_base_url = Some(url);
        }
        Ok(())
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dimensions == 0 {
            return Err(RetrievalError::Config("embedding_dimensions must be > 0".into()));
        }
        if self.call_timeout_ms == 0 {
            return Err(RetrievalError::Config("call_timeout_ms must be > 0".into()));
        }
        if self.default_top_k == 0 {
            return Err(RetrievalError::Config("default_top_k must be > 0".into()));
        }
        Ok(())
    }

    /// Data directory with `~` expanded.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir.to_string_lossy()).to_string())
    }

    /// RocksDB rule store directory.
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir().join("rules")
    }

    /// Index snapshot directory.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir().join("index")
    }

    /// Cache directory for downloaded local models.
    pub fn model_dir(&self) -> PathBuf {
        self.data_dir().join("models")
    }

    /// Bound applied to external calls.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RetrievalError::Config(format!("{} is not a valid number: {:?}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = RetrievalConfig::default();
        config.validate().unwrap();
        assert_eq!(config.default_top_k, 3);
        assert_eq!(config.embedding_dimensions, 384);
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("RULES_DATA_DIR", "/srv/rules"),
            ("RULES_EMBEDDING_MODEL", "text-embedding-3-small"),
            ("RULES_CALL_TIMEOUT_MS", "1500"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:8080/v1"),
        ]
        .into_iter()
        .collect();

        let mut config = RetrievalConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.store_dir(), PathBuf::from("/srv/rules/rules"));
        assert_eq!(config.snapshot_dir(), PathBuf::from("/srv/rules/index"));
        assert_eq!(config.embedding_model, "text-embedding-3-small");
        assert_eq!(config.call_timeout(), Duration::from_millis(1500));
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.openai_base_url.as_deref(), Some("http://localhost:8080/v1"));
        assert_eq!(config.model_dir(), PathBuf::from("/srv/rules/models"));
    }

    #[test]
    fn test_bad_number_is_config_error() {
        let mut config = RetrievalConfig::default();
        let err = config
            .apply_env(|key| (key == "RULES_DEFAULT_TOP_K").then(|| "three".to_string()))
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(&path, r#"{"data_dir": "/tmp/rules-test", "default_top_k": 5}"#).unwrap();

        let config = RetrievalConfig::load(&path).unwrap();
        assert_eq!(config.default_top_k, 5);
        assert_eq!(config.embedding_model, LOCAL_MODEL);
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/rules-test"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = RetrievalConfig {
            call_timeout_ms: 0,
            ..RetrievalConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
