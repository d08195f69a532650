//! Tiered text embeddings.
//!
//! [`EmbeddingProvider`] turns text into vectors of one configured width,
//! trying three tiers in order:
//!
//! - **Local** - an ONNX model plus tokenizer running in-process (feature
//!   `onnx`, on by default). Assets may be downloaded on first use.
//! - **Remote** - an OpenAI-style `/v1/embeddings` server, discovered by
//!   probing the configured base URLs and picking the first preferred model
//!   each one offers. Endpoints sit behind circuit breakers.
//! - **Hash** - a SHA-256 derived vector. Deterministic and always available,
//!   but carries no meaning beyond exact-text identity.
//!
//! Whatever a tier returns is fitted to the configured dimension (truncated,
//! or tiled and L2-normalized). Empty or whitespace-only text always yields
//! the zero vector. Embedding never fails; failed tiers are logged and
//! skipped.
//!
//! ```no_run
//! use semantic::{EmbeddingProvider, SemanticConfig};
//!
//! # async fn demo() -> Result<(), semantic::SemanticError> {
//! let provider = EmbeddingProvider::new(SemanticConfig::default())?;
//! let emb = provider.embed("where did we leave the boat?").await;
//! assert_eq!(emb.vector.len(), provider.dimension());
//! println!("{} via {}", emb.model_name, emb.tier);
//! # Ok(())
//! # }
//! ```
//!
//! ## Threading notes
//!
//! ONNX sessions are not `Send`, so they are cached per thread. The first
//! embed call on a thread loads the model; later calls reuse it.

pub mod circuit_breaker;
pub mod config;
pub mod dimension;
pub mod error;
pub mod hash;
pub mod local;
pub mod provider;
pub mod remote;
pub mod types;
mod serde_millis;

#[cfg(feature = "onnx")]
mod assets;
#[cfg(feature = "onnx")]
mod cache;
#[cfg(feature = "onnx")]
mod onnx;

pub use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitState,
};
pub use crate::config::{LocalModelConfig, PadStrategy, RemoteConfig, SemanticConfig};
pub use crate::dimension::{fit_to_dimension, l2_normalize_in_place};
pub use crate::error::SemanticError;
pub use crate::hash::{hash_embedding, HASH_MODEL_NAME};
pub use crate::local::LocalModel;
#[cfg(feature = "onnx")]
pub use crate::local::OnnxModel;
pub use crate::provider::EmbeddingProvider;
pub use crate::remote::{HttpEmbedder, RemoteEmbedder, RemoteEmbeddings, ResolvedEndpoint};
pub use crate::types::{EmbeddingTier, SemanticEmbedding};
