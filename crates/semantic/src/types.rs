use serde::{Deserialize, Serialize};

/// Which tier produced an embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingTier {
    /// In-process model.
    Local,
    /// Remote HTTP embedding service.
    Remote,
    /// Deterministic digest-derived vector.
    Hash,
    /// Empty or whitespace-only input; the vector is all zeros.
    Empty,
}

impl EmbeddingTier {
    pub fn as_str(self) -> &'static str {
        match self {
            EmbeddingTier::Local => "local",
            EmbeddingTier::Remote => "remote",
            EmbeddingTier::Hash => "hash",
            EmbeddingTier::Empty => "empty",
        }
    }

    /// True for tiers that carry real semantic signal.
    pub fn is_semantic(self) -> bool {
        matches!(self, EmbeddingTier::Local | EmbeddingTier::Remote)
    }
}

impl std::fmt::Display for EmbeddingTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fixed-width embedding plus where it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemanticEmbedding {
    /// Exactly `embedding_dim` finite components.
    pub vector: Vec<f32>,
    /// Model that produced the raw vector (`hash-sha256` for the hash tier).
    pub model_name: String,
    pub tier: EmbeddingTier,
    /// Width of the raw vector before dimension normalization.
    pub source_dim: usize,
    pub embedding_dim: usize,
}

impl SemanticEmbedding {
    pub fn is_zero(&self) -> bool {
        self.vector.iter().all(|v| *v == 0.0)
    }
}
