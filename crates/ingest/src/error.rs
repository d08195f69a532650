//! Error types produced by the ingest crate.
//!
//! Parsing itself never fails: malformed JSON spans are dropped and unparseable
//! input degrades to a plain-text document. The errors below cover the parts
//! that touch the outside world (reading corpus files, walking directories) and
//! configuration that cannot be honoured.
//!
//! | Error | Category | Description |
//! |-------|----------|-------------|
//! | [`Io`](IngestError::Io) | Filesystem | A corpus file could not be read |
//! | [`Walk`](IngestError::Walk) | Filesystem | Directory traversal failed |
//! | [`InvalidUtf8`](IngestError::InvalidUtf8) | Validation | A corpus file is not UTF-8 |
//! | [`InvalidConfig`](IngestError::InvalidConfig) | Configuration | Chunking/corpus settings are inconsistent |
//!
//! ```rust
//! use ingest::IngestError;
//!
//! fn is_retryable(error: &IngestError) -> bool {
//!     matches!(error, IngestError::Io(_) | IngestError::Walk(_))
//! }
//!
//! assert!(is_retryable(&IngestError::Io("busy".into())));
//! assert!(!is_retryable(&IngestError::InvalidConfig("overlap".into())));
//! ```
use thiserror::Error;

/// Errors that can occur while loading or chunking a corpus.
///
/// Variants carry rendered messages rather than source errors so the enum stays
/// `Clone` and comparable in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IngestError {
    /// Reading a corpus file failed.
    #[error("io error: {0}")]
    Io(String),
    /// Walking the corpus directory failed.
    #[error("corpus walk failed: {0}")]
    Walk(String),
    /// A corpus file is not valid UTF-8.
    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(String),
    /// Configuration values are inconsistent.
    ///
    /// ```rust
    /// use ingest::{ChunkingConfig, IngestError};
    ///
    /// let cfg = ChunkingConfig { chunk_size: 100, chunk_overlap: 100 };
    /// assert!(matches!(cfg.validate(), Err(IngestError::InvalidConfig(_))));
    /// ```
    #[error("invalid ingest config: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::Io(err.to_string())
    }
}

impl From<walkdir::Error> for IngestError {
    fn from(err: walkdir::Error) -> Self {
        IngestError::Walk(err.to_string())
    }
}
