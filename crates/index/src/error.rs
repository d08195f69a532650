use bincode::error::{DecodeError, EncodeError};
use ingest::IngestError;
use thiserror::Error;

/// Errors raised while building, persisting or querying a vector index.
#[derive(Error, Debug, Clone)]
pub enum IndexError {
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Serialization encode error: {0}")]
    Encode(String),
    #[error("Serialization decode error: {0}")]
    Decode(String),
    #[error("Compression error: {0}")]
    Zstd(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Snapshot metadata error: {0}")]
    Metadata(String),
    #[error("Corpus error: {0}")]
    Ingest(#[from] IngestError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("no index has been built yet")]
    NotBuilt,
    #[error("embedding has {got} components, index expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl From<EncodeError> for IndexError {
    fn from(e: EncodeError) -> Self {
        IndexError::Encode(e.to_string())
    }
}

impl From<DecodeError> for IndexError {
    fn from(e: DecodeError) -> Self {
        IndexError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(e: serde_json::Error) -> Self {
        IndexError::Metadata(e.to_string())
    }
}

impl IndexError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }
}
