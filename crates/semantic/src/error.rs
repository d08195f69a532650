use std::io;
use thiserror::Error;

/// Errors raised inside individual embedding tiers.
///
/// These never reach callers of [`EmbeddingProvider::embed`](crate::EmbeddingProvider::embed);
/// the provider logs them and falls through to the next tier.
#[derive(Debug, Error)]
pub enum SemanticError {
    /// The ONNX model could not be located locally and no download URL was provided.
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    /// The tokenizer JSON is missing and there was no remote URL to fetch it from.
    #[error("tokenizer missing: {0}")]
    TokenizerMissing(String),
    #[error("invalid semantic config: {0}")]
    InvalidConfig(String),
    /// Unable to download model assets.
    #[error("download failed: {0}")]
    Download(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// ONNX Runtime, tokenizer or output-shape errors.
    #[error("inference failure: {0}")]
    Inference(String),
    /// A remote endpoint answered with an error or an unusable body.
    #[error("remote embedding failed: {0}")]
    Remote(String),
    /// No candidate base URL answered the liveness probe with a usable model.
    #[error("no remote embedding endpoint available")]
    NoRemoteEndpoint,
    /// The breaker for this endpoint is open.
    #[error("circuit open for {0}")]
    CircuitOpen(String),
    /// The local tier is compiled out or not configured.
    #[error("tier unavailable: {0}")]
    Unavailable(&'static str),
}

impl SemanticError {
    /// Errors that will not go away by retrying the same tier with other input.
    ///
    /// Used by batch embedding to decide whether a failed batch is worth
    /// retrying item by item.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            SemanticError::ModelNotFound(_)
                | SemanticError::TokenizerMissing(_)
                | SemanticError::Download(_)
                | SemanticError::InvalidConfig(_)
                | SemanticError::NoRemoteEndpoint
                | SemanticError::CircuitOpen(_)
                | SemanticError::Unavailable(_)
        )
    }
}

impl From<reqwest::Error> for SemanticError {
    fn from(err: reqwest::Error) -> Self {
        SemanticError::Remote(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = SemanticError::ModelNotFound("/models/m.onnx".into());
        assert!(err.to_string().contains("model file not found"));
        assert!(err.to_string().contains("/models/m.onnx"));

        assert_eq!(
            SemanticError::NoRemoteEndpoint.to_string(),
            "no remote embedding endpoint available"
        );
        assert!(SemanticError::CircuitOpen("http://x".into())
            .to_string()
            .contains("http://x"));
    }

    #[test]
    fn from_io() {
        let err: SemanticError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, SemanticError::Io(_)));
        assert!(!err.is_unavailable());
    }

    #[test]
    fn unavailability_classification() {
        assert!(SemanticError::TokenizerMissing("t".into()).is_unavailable());
        assert!(SemanticError::Unavailable("local").is_unavailable());
        assert!(!SemanticError::Inference("shape".into()).is_unavailable());
        assert!(!SemanticError::Remote("500".into()).is_unavailable());
    }
}
