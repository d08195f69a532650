//! YAML configuration for the retrieval pipeline.
//!
//! Every section is optional and falls back to its defaults, so the smallest
//! valid file is just the version line.
//!
//! ```yaml
//! version: "1.0"
//! name: "companion"
//! corpus_path: "./data"
//!
//! semantic:
//!   dimension: 1536
//!   pad_strategy: seeded_noise
//!   local:
//!     model_name: "all-MiniLM-L6-v2"
//!     model_path: "./models/all-MiniLM-L6-v2/onnx/model.onnx"
//!     tokenizer_path: "./models/all-MiniLM-L6-v2/tokenizer.json"
//!   remote:
//!     base_urls: ["http://localhost:11434", "http://localhost:1234"]
//!     preferred_models: ["nomic-embed-text", "all-minilm"]
//!     embed_timeout: 30000
//!
//! index:
//!   cache_dir: "./cache/vector_index"
//!   corpus:
//!     extensions: ["txt", "json"]
//!     chunking: { chunk_size: 1000, chunk_overlap: 100 }
//!
//! search:
//!   threshold: 0.7
//!   relaxed_factor: 0.8
//!
//! assembler:
//!   max_context_documents: 20
//! ```
//!
//! After loading, [`RagConfig::apply_env_overrides`] lets deployments point
//! at a different corpus, cache or remote service without editing the file:
//! `RAGCTX_CORPUS_PATH`, `RAGCTX_CACHE_DIR`, `RAGCTX_REMOTE_URLS`
//! (comma-separated) and `RAGCTX_MODEL_PATH`.

use std::fs;
use std::path::{Path, PathBuf};

use index::IndexCacheConfig;
use matcher::{AssemblerConfig, SearchConfig};
use semantic::SemanticConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_CORPUS_PATH: &str = "RAGCTX_CORPUS_PATH";
pub const ENV_CACHE_DIR: &str = "RAGCTX_CACHE_DIR";
pub const ENV_REMOTE_URLS: &str = "RAGCTX_REMOTE_URLS";
pub const ENV_MODEL_PATH: &str = "RAGCTX_MODEL_PATH";

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level configuration for the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Configuration format version
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Corpus root indexed by [`Pipeline::ensure_index`](crate::Pipeline::ensure_index).
    #[serde(default = "default_corpus_path")]
    pub corpus_path: PathBuf,

    #[serde(default)]
    pub semantic: SemanticConfig,

    #[serde(default)]
    pub index: IndexCacheConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub assembler: AssemblerConfig,
}

impl RagConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: RagConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_corpus_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.corpus_path = path.into();
        self
    }

    pub fn with_semantic(mut self, semantic: SemanticConfig) -> Self {
        self.semantic = semantic;
        self
    }

    pub fn with_index(mut self, index: IndexCacheConfig) -> Self {
        self.index = index;
        self
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        if self.corpus_path.as_os_str().is_empty() {
            return Err(ConfigLoadError::Validation(
                "corpus_path must not be empty".into(),
            ));
        }
        self.semantic.validate().map_err(invalid("semantic"))?;
        self.index.validate().map_err(invalid("index"))?;
        self.search.validate().map_err(invalid("search"))?;
        self.assembler.validate().map_err(invalid("assembler"))?;
        Ok(())
    }

    /// Apply `RAGCTX_*` overrides from the process environment, then
    /// re-validate.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigLoadError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get(ENV_CORPUS_PATH) {
            self.corpus_path = PathBuf::from(path);
        }
        if let Some(dir) = get(ENV_CACHE_DIR) {
            self.index.cache_dir = PathBuf::from(dir);
        }
        if let Some(urls) = get(ENV_REMOTE_URLS) {
            let urls: Vec<String> = urls
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect();
            if !urls.is_empty() {
                self.semantic.remote.base_urls = urls;
                self.semantic.remote.enabled = true;
            }
        }
        if let Some(path) = get(ENV_MODEL_PATH) {
            let local = self.semantic.local.take().unwrap_or_default();
            self.semantic.local = Some(local.with_model_path(path));
        }
        self.validate()
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            corpus_path: default_corpus_path(),
            semantic: SemanticConfig::default(),
            index: IndexCacheConfig::default(),
            search: SearchConfig::default(),
            assembler: AssemblerConfig::default(),
        }
    }
}

fn default_corpus_path() -> PathBuf {
    PathBuf::from("./data")
}

fn invalid<E: std::fmt::Display>(section: &'static str) -> impl Fn(E) -> ConfigLoadError {
    move |err| ConfigLoadError::Validation(format!("{section}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config = RagConfig::from_yaml("version: \"1\"\n").unwrap();
        assert_eq!(config.semantic.dimension, 1536);
        assert_eq!(config.search.threshold, 0.7);
        assert_eq!(config.assembler.max_context_documents, 20);
        assert_eq!(config.index.corpus.chunking.chunk_size, 1000);
        assert_eq!(config.corpus_path, PathBuf::from("./data"));
    }

    #[test]
    fn test_load_from_file() {
        let yaml = r#"
version: "1.0"
name: "test config"
corpus_path: "/srv/corpus"
search:
  threshold: 0.5
"#;
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml.as_bytes()).unwrap();

        let config = RagConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.name.as_deref(), Some("test config"));
        assert_eq!(config.corpus_path, PathBuf::from("/srv/corpus"));
        assert_eq!(config.search.threshold, 0.5);
        assert_eq!(config.search.relaxed_factor, 0.8);
    }

    #[test]
    fn test_unsupported_version() {
        let err = RagConfig::from_yaml("version: \"2\"\n").unwrap_err();
        assert!(matches!(err, ConfigLoadError::UnsupportedVersion(v) if v == "2"));
    }

    #[test]
    fn test_section_validation() {
        let yaml = r#"
version: "1.0"
semantic:
  dimension: 0
"#;
        let err = RagConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("semantic"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_CORPUS_PATH, "/data/people"),
            (ENV_CACHE_DIR, "/tmp/ragctx"),
            (ENV_REMOTE_URLS, "http://a:1, http://b:2,"),
            (ENV_MODEL_PATH, "/models/mini.onnx"),
        ]
        .into_iter()
        .collect();

        let mut config = RagConfig::default();
        config.semantic.remote.enabled = false;
        config
            .apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.corpus_path, PathBuf::from("/data/people"));
        assert_eq!(config.index.cache_dir, PathBuf::from("/tmp/ragctx"));
        assert_eq!(config.semantic.remote.base_urls, ["http://a:1", "http://b:2"]);
        assert!(config.semantic.remote.enabled);
        assert_eq!(
            config.semantic.local.unwrap().model_path,
            PathBuf::from("/models/mini.onnx")
        );
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = RagConfig::default();
        config
            .apply_overrides_from(|k| (k == ENV_CORPUS_PATH).then(|| "  ".to_string()))
            .unwrap();
        assert_eq!(config.corpus_path, PathBuf::from("./data"));
    }
}
