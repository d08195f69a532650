//! Configuration types for chunking and corpus discovery.
//!
//! Both structs are cheap to clone and deserialize from the pipeline YAML file.
//!
//! ```rust
//! use ingest::{ChunkingConfig, CorpusConfig};
//!
//! let chunking = ChunkingConfig::default().with_chunk_size(800).with_chunk_overlap(80);
//! chunking.validate().expect("valid chunking");
//!
//! let corpus = CorpusConfig::default();
//! assert!(corpus.accepts_extension("json"));
//! assert!(!corpus.accepts_extension("pdf"));
//! ```
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::IngestError;

/// Fixed-window chunking applied to plain-text sources.
///
/// Consecutive windows share `chunk_overlap` characters so a passage crossing a
/// boundary is still fully contained in at least one chunk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Window length in characters.
    #[serde(default = "ChunkingConfig::default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by consecutive windows. Must be smaller than `chunk_size`.
    #[serde(default = "ChunkingConfig::default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl ChunkingConfig {
    pub(crate) fn default_chunk_size() -> usize {
        1000
    }

    pub(crate) fn default_chunk_overlap() -> usize {
        100
    }

    /// Smaller windows used for documents added to a live index.
    pub fn for_added_documents() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_chunk_overlap(mut self, chunk_overlap: usize) -> Self {
        self.chunk_overlap = chunk_overlap;
        self
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidConfig(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: Self::default_chunk_size(),
            chunk_overlap: Self::default_chunk_overlap(),
        }
    }
}

/// Which files under a corpus root are indexed and how owners are derived.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorpusConfig {
    /// Lower-case file extensions (without the dot) that take part in indexing
    /// and in the corpus fingerprint.
    #[serde(default = "CorpusConfig::default_extensions")]
    pub extensions: Vec<String>,
    /// Sub-directory holding `<owner>_messages.json` files.
    #[serde(default = "CorpusConfig::default_messages_dir")]
    pub messages_dir: String,
    /// Suffix stripped from message file stems to recover the owner.
    #[serde(default = "CorpusConfig::default_messages_suffix")]
    pub messages_suffix: String,
    /// Chunking for plain-text files (and JSON files without message bodies).
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Namespace for the UUIDv5 document ids derived from source and position.
    /// Default: [`Uuid::NAMESPACE_OID`]
    #[serde(default = "CorpusConfig::default_doc_id_namespace")]
    pub doc_id_namespace: Uuid,
}

impl CorpusConfig {
    pub(crate) fn default_extensions() -> Vec<String> {
        vec!["txt".into(), "json".into()]
    }

    pub(crate) fn default_messages_dir() -> String {
        "messages_examples".into()
    }

    pub(crate) fn default_messages_suffix() -> String {
        "_messages".into()
    }

    pub(crate) fn default_doc_id_namespace() -> Uuid {
        Uuid::NAMESPACE_OID
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    /// Case-insensitive extension check.
    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.extensions.is_empty() {
            return Err(IngestError::InvalidConfig(
                "at least one corpus extension is required".into(),
            ));
        }
        self.chunking.validate()
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            extensions: Self::default_extensions(),
            messages_dir: Self::default_messages_dir(),
            messages_suffix: Self::default_messages_suffix(),
            chunking: ChunkingConfig::default(),
            doc_id_namespace: Self::default_doc_id_namespace(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_defaults() {
        let cfg = ChunkingConfig::default();
        assert_eq!(cfg.chunk_size, 1000);
        assert_eq!(cfg.chunk_overlap, 100);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn chunking_rejects_zero_size_and_large_overlap() {
        assert!(ChunkingConfig::default().with_chunk_size(0).validate().is_err());
        let err = ChunkingConfig::default()
            .with_chunk_size(10)
            .with_chunk_overlap(10)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn added_documents_use_smaller_windows() {
        let cfg = ChunkingConfig::for_added_documents();
        assert_eq!((cfg.chunk_size, cfg.chunk_overlap), (500, 50));
    }

    #[test]
    fn corpus_extension_matching_is_case_insensitive() {
        let cfg = CorpusConfig::default();
        assert!(cfg.accepts_extension("TXT"));
        assert!(cfg.accepts_extension("json"));
        assert!(!cfg.accepts_extension("md"));
    }

    #[test]
    fn corpus_requires_extensions() {
        let cfg = CorpusConfig::default().with_extensions(Vec::<String>::new());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn corpus_config_deserializes_with_defaults() {
        let cfg: CorpusConfig = serde_json::from_str(r#"{"extensions":["md"]}"#).unwrap();
        assert_eq!(cfg.extensions, vec!["md".to_string()]);
        assert_eq!(cfg.messages_dir, "messages_examples");
        assert_eq!(cfg.chunking, ChunkingConfig::default());
    }
}
