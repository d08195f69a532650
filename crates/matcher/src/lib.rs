//! # Matcher
//!
//! Query-time half of the retrieval pipeline. It sits on top of `index` (the
//! [`VectorStore`](index::VectorStore)s being searched) and `semantic` (the
//! provider that embeds queries).
//!
//! ## Core types
//!
//! - [`SimilaritySearch`] - owner-scoped search with backfill. When the
//!   primary query comes back sparse (fewer than half of `limit`), the general
//!   store fills the remaining slots at a relaxed threshold (0.8x) and the two
//!   lists are merged by score. A failing store contributes nothing.
//! - [`ContextAssembler`] - embeds the query once, runs the search, drops
//!   duplicate content, truncates, and scores the result:
//!   `confidence = 0.7 * mean(similarity) + 0.3 * min(n / 10, 1)`.
//! - [`ContextSet`] - what prompt construction receives. An empty set with
//!   confidence `0.0` is a normal outcome, not an error.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use index::{VectorIndex, VectorStore};
//! use matcher::{AssemblerConfig, ContextAssembler, SearchConfig, SearchScope, SimilaritySearch};
//! use semantic::EmbeddingProvider;
//!
//! # async fn demo(index: VectorIndex) -> Result<(), matcher::MatchError> {
//! let provider = Arc::new(EmbeddingProvider::hash_only(index.dimension()));
//! let store: Arc<dyn VectorStore> = Arc::new(index);
//! let search = SimilaritySearch::new(store, SearchConfig::default())?;
//! let assembler = ContextAssembler::new(provider, search, AssemblerConfig::default())?;
//!
//! let ctx = assembler
//!     .build_context("what did we plan for saturday?", &SearchScope::owner("alice"), 5, 0.3)
//!     .await;
//! println!("{} documents, confidence {:.2} ({})", ctx.len(), ctx.confidence_score, ctx.quality_level());
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod search;
pub mod types;

pub use crate::assembler::{
    adaptive_threshold, confidence_score, dedup_by_content, quality_level, ContextAssembler,
};
pub use crate::search::SimilaritySearch;
pub use crate::types::{
    AdaptiveContext, AssemblerConfig, ContextSet, ContextualDocument, ContextualSet, MatchError,
    SearchConfig, SearchOutcome, SearchScope,
};
