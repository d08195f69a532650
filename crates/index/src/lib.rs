//! # Vector index cache
//!
//! This crate owns the searchable index over a document corpus and its
//! on-disk snapshots.
//!
//! ## Core pieces
//!
//! - [`VectorIndex`] - a flat, in-memory list of documents with embeddings,
//!   searched by cosine similarity. It implements [`VectorStore`], the trait
//!   the search layer queries through.
//! - [`VectorIndexCache`] - decides whether the current index is still good.
//!   Its key is a [corpus fingerprint](corpus_fingerprint) (path, mtime and
//!   size of every eligible file) plus the embedding model id. On a mismatch
//!   it loads, chunks and embeds the corpus again.
//! - [`SnapshotStore`] - content-addressed snapshot files
//!   (`index-<fingerprint>.bin` plus `.meta.json`), bincode encoded and zstd
//!   compressed, written atomically.
//!
//! ## Example
//!
//! ```no_run
//! use std::{path::Path, sync::Arc};
//! use index::{IndexCacheConfig, VectorIndexCache, VectorStore};
//! use semantic::EmbeddingProvider;
//!
//! # async fn demo() -> Result<(), index::IndexError> {
//! let provider = Arc::new(EmbeddingProvider::hash_only(384));
//! let cache = VectorIndexCache::new(IndexCacheConfig::default(), provider.clone())?;
//!
//! let index = cache.ensure_index(Path::new("./data")).await?;
//! let query = provider.embed("when is the next race?").await;
//! for hit in index.search(&query.vector, Some("alice"), 5, 0.3)? {
//!     println!("{:.3} {}", hit.similarity_score, hit.document.content);
//! }
//! # Ok(())
//! # }
//! ```

mod cache;
mod error;
mod fingerprint;
mod snapshot;
mod store;

pub use crate::cache::{
    CacheInfo, Ensured, IndexCacheConfig, IndexHandle, IndexSource, VectorIndexCache,
};
pub use crate::error::IndexError;
pub use crate::fingerprint::corpus_fingerprint;
pub use crate::snapshot::{
    CompressionCodec, CompressionConfig, SnapshotFile, SnapshotMeta, SnapshotStore,
    SNAPSHOT_SCHEMA_VERSION,
};
pub use crate::store::{cosine_similarity, ScoredDocument, VectorIndex, VectorStore};
pub use ingest::Document;
