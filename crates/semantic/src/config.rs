use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::SemanticError;

/// How vectors narrower than the target dimension are widened.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PadStrategy {
    /// Tile the vector, fill the remainder with a noise-perturbed copy of its
    /// leading slice, then L2-normalize. Noise is seeded from the raw vector,
    /// so identical inputs pad identically.
    #[default]
    SeededNoise,
    /// Append zeros, then L2-normalize.
    ZeroFill,
}

/// Top-level embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SemanticConfig {
    /// Target width `D` of every embedding leaving the provider.
    pub dimension: usize,
    pub pad_strategy: PadStrategy,
    /// Relative amplitude of the padding noise.
    pub pad_noise: f32,
    /// Local ONNX model. `None` skips the local tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalModelConfig>,
    pub remote: RemoteConfig,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            dimension: 1536,
            pad_strategy: PadStrategy::SeededNoise,
            pad_noise: 0.01,
            local: None,
            remote: RemoteConfig::default(),
        }
    }
}

impl SemanticConfig {
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_pad_strategy(mut self, strategy: PadStrategy) -> Self {
        self.pad_strategy = strategy;
        self
    }

    pub fn with_local(mut self, local: LocalModelConfig) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = remote;
        self
    }

    /// Configuration with only the hash tier enabled.
    pub fn hash_only(dimension: usize) -> Self {
        Self {
            dimension,
            local: None,
            remote: RemoteConfig::disabled(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), SemanticError> {
        if self.dimension == 0 {
            return Err(SemanticError::InvalidConfig(
                "dimension must be greater than zero".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.pad_noise) {
            return Err(SemanticError::InvalidConfig(format!(
                "pad_noise must be in [0, 1), got {}",
                self.pad_noise
            )));
        }
        if let Some(local) = &self.local {
            local.validate()?;
        }
        self.remote.validate()
    }
}

/// Where the local model and tokenizer live, and where to fetch them from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocalModelConfig {
    pub model_name: String,
    pub model_path: PathBuf,
    pub model_url: Option<String>,
    pub tokenizer_path: Option<PathBuf>,
    pub tokenizer_url: Option<String>,
    /// Directory downloaded assets are written to when no explicit path is set.
    pub cache_dir: Option<PathBuf>,
    pub max_sequence_length: usize,
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            model_name: "all-MiniLM-L6-v2".into(),
            model_path: PathBuf::from("./models/all-MiniLM-L6-v2/onnx/model.onnx"),
            model_url: None,
            tokenizer_path: Some(PathBuf::from("./models/all-MiniLM-L6-v2/tokenizer.json")),
            tokenizer_url: None,
            cache_dir: None,
            max_sequence_length: 256,
        }
    }
}

impl LocalModelConfig {
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }

    pub fn with_tokenizer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tokenizer_path = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<(), SemanticError> {
        if self.model_name.trim().is_empty() {
            return Err(SemanticError::InvalidConfig(
                "local model_name must not be empty".into(),
            ));
        }
        if self.max_sequence_length == 0 {
            return Err(SemanticError::InvalidConfig(
                "max_sequence_length must be greater than zero".into(),
            ));
        }
        if self.tokenizer_path.is_none() && self.tokenizer_url.is_none() {
            return Err(SemanticError::InvalidConfig(
                "local model needs tokenizer_path or tokenizer_url".into(),
            ));
        }
        Ok(())
    }
}

/// Remote embedding service discovery and call settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    /// Candidate base URLs, probed in order.
    pub base_urls: Vec<String>,
    /// Model names accepted from the listing, in order of preference.
    pub preferred_models: Vec<String>,
    /// Sent verbatim as the `Authorization` header when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_header: Option<String>,
    #[serde(with = "crate::serde_millis")]
    pub probe_timeout: Duration,
    #[serde(with = "crate::serde_millis")]
    pub list_timeout: Duration,
    #[serde(with = "crate::serde_millis")]
    pub embed_timeout: Duration,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_urls: vec![
                "http://localhost:11434".into(),
                "http://localhost:1234".into(),
            ],
            preferred_models: vec![
                "text-embedding-3-small".into(),
                "text-embedding-ada-002".into(),
                "nomic-embed-text".into(),
                "all-minilm".into(),
            ],
            auth_header: None,
            probe_timeout: Duration::from_secs(2),
            list_timeout: Duration::from_secs(5),
            embed_timeout: Duration::from_secs(30),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl RemoteConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_base_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_preferred_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeouts(mut self, probe: Duration, list: Duration, embed: Duration) -> Self {
        self.probe_timeout = probe;
        self.list_timeout = list;
        self.embed_timeout = embed;
        self
    }

    pub fn validate(&self) -> Result<(), SemanticError> {
        if !self.enabled {
            return Ok(());
        }
        if self.base_urls.is_empty() {
            return Err(SemanticError::InvalidConfig(
                "remote tier enabled without base_urls".into(),
            ));
        }
        if self.preferred_models.is_empty() {
            return Err(SemanticError::InvalidConfig(
                "remote tier enabled without preferred_models".into(),
            ));
        }
        if self.probe_timeout.is_zero() || self.embed_timeout.is_zero() {
            return Err(SemanticError::InvalidConfig(
                "remote timeouts must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = SemanticConfig::default();
        assert_eq!(cfg.dimension, 1536);
        assert_eq!(cfg.pad_strategy, PadStrategy::SeededNoise);
        assert!(cfg.local.is_none());
        assert_eq!(cfg.remote.probe_timeout, Duration::from_secs(2));
        assert_eq!(cfg.remote.list_timeout, Duration::from_secs(5));
        assert_eq!(cfg.remote.embed_timeout, Duration::from_secs(30));
        assert_eq!(cfg.remote.preferred_models[0], "text-embedding-3-small");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_dimension() {
        assert!(SemanticConfig::default()
            .with_dimension(0)
            .validate()
            .is_err());
    }

    #[test]
    fn remote_requires_urls_when_enabled() {
        let remote = RemoteConfig::default().with_base_urls(Vec::<String>::new());
        assert!(remote.validate().is_err());
        assert!(RemoteConfig::disabled()
            .with_base_urls(Vec::<String>::new())
            .validate()
            .is_ok());
    }

    #[test]
    fn local_requires_tokenizer_source() {
        let local = LocalModelConfig {
            tokenizer_path: None,
            tokenizer_url: None,
            ..LocalModelConfig::default()
        };
        assert!(local.validate().is_err());
    }

    #[test]
    fn serde_roundtrip_uses_millis() {
        let cfg = SemanticConfig::default().with_local(LocalModelConfig::default());
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["remote"]["probe_timeout"], 2000);
        assert_eq!(json["pad_strategy"], "seeded_noise");
        let back: SemanticConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, cfg);
    }
}
