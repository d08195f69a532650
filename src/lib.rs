//! Workspace umbrella crate for the retrieval pipeline.
//!
//! This crate stitches together the embedding provider, the cached vector
//! index and context assembly so callers can answer a query against a corpus
//! with a single API entry point, [`Pipeline::build_context`].

pub mod config;

pub use crate::config::{ConfigLoadError, RagConfig};
pub use index::{
    CacheInfo, Ensured, IndexCacheConfig, IndexError, IndexHandle, IndexSource, ScoredDocument,
    VectorIndex, VectorIndexCache, VectorStore,
};
pub use ingest::{ChunkingConfig, CorpusConfig, Document, IngestError};
pub use matcher::{
    AdaptiveContext, AssemblerConfig, ContextAssembler, ContextSet, ContextualDocument,
    ContextualSet, MatchError, SearchConfig, SearchScope, SimilaritySearch,
};
pub use semantic::{
    EmbeddingProvider, EmbeddingTier, LocalModel, RemoteEmbedder, SemanticConfig,
    SemanticEmbedding, SemanticError,
};

use std::error::Error;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};

use tracing::{info, warn, Instrument, Level};

/// Errors surfaced by the pipeline facade.
#[derive(Debug)]
pub enum PipelineError {
    Config(ConfigLoadError),
    Semantic(SemanticError),
    Index(IndexError),
    Match(MatchError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Config(err) => write!(f, "configuration failure: {err}"),
            PipelineError::Semantic(err) => write!(f, "embedding provider failure: {err}"),
            PipelineError::Index(err) => write!(f, "vector index failure: {err}"),
            PipelineError::Match(err) => write!(f, "context assembly failure: {err}"),
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PipelineError::Config(err) => Some(err),
            PipelineError::Semantic(err) => Some(err),
            PipelineError::Index(err) => Some(err),
            PipelineError::Match(err) => Some(err),
        }
    }
}

impl From<ConfigLoadError> for PipelineError {
    fn from(value: ConfigLoadError) -> Self {
        PipelineError::Config(value)
    }
}

impl From<SemanticError> for PipelineError {
    fn from(value: SemanticError) -> Self {
        PipelineError::Semantic(value)
    }
}

impl From<IndexError> for PipelineError {
    fn from(value: IndexError) -> Self {
        PipelineError::Index(value)
    }
}

impl From<MatchError> for PipelineError {
    fn from(value: MatchError) -> Self {
        PipelineError::Match(value)
    }
}

/// Metrics observer for pipeline stages.
pub trait PipelineMetrics: Send + Sync {
    fn record_ensure_index(&self, latency: Duration, result: Result<IndexSource, IndexError>);
    fn record_build_context(&self, latency: Duration, documents: usize, confidence: f32);
}

/// Install or clear the global pipeline metrics recorder.
pub fn set_pipeline_metrics(recorder: Option<Arc<dyn PipelineMetrics>>) {
    let mut guard = metrics_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn PipelineMetrics>>> {
    static METRICS: OnceLock<RwLock<Option<Arc<dyn PipelineMetrics>>>> = OnceLock::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

fn metrics_recorder() -> Option<Arc<dyn PipelineMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

/// Retrieval pipeline over one corpus.
///
/// The index is built lazily on the first query (or an explicit
/// [`ensure_index`](Self::ensure_index)) and reused until the corpus or the
/// embedding model changes.
pub struct Pipeline {
    cfg: RagConfig,
    provider: Arc<EmbeddingProvider>,
    cache: VectorIndexCache,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("corpus_path", &self.cfg.corpus_path)
            .field("model_id", &self.provider.model_id())
            .finish()
    }
}

impl Pipeline {
    /// Build the provider from `cfg.semantic` and wire the cache.
    pub fn new(cfg: RagConfig) -> Result<Self, PipelineError> {
        cfg.validate()?;
        let provider = EmbeddingProvider::new(cfg.semantic.clone())?;
        Self::with_provider(cfg, Arc::new(provider))
    }

    /// Use an already constructed provider; `cfg.semantic` is ignored.
    pub fn with_provider(
        cfg: RagConfig,
        provider: Arc<EmbeddingProvider>,
    ) -> Result<Self, PipelineError> {
        cfg.search.validate()?;
        cfg.assembler.validate()?;
        let cache = VectorIndexCache::new(cfg.index.clone(), Arc::clone(&provider))?;
        Ok(Self {
            cfg,
            provider,
            cache,
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.cfg
    }

    pub fn provider(&self) -> &Arc<EmbeddingProvider> {
        &self.provider
    }

    pub fn cache(&self) -> &VectorIndexCache {
        &self.cache
    }

    /// Ensure the index for the configured corpus path.
    pub async fn ensure_index(&self) -> Result<Ensured, PipelineError> {
        self.ensure_index_at(&self.cfg.corpus_path).await
    }

    pub async fn ensure_index_at(&self, corpus_root: &Path) -> Result<Ensured, PipelineError> {
        let start = Instant::now();
        let result = self.cache.ensure(corpus_root).await;
        if let Some(recorder) = metrics_recorder() {
            let outcome = result.as_ref().map(|e| e.source).map_err(Clone::clone);
            recorder.record_ensure_index(start.elapsed(), outcome);
        }
        Ok(result?)
    }

    /// Drop cached snapshots and the live index.
    pub fn invalidate(&self) -> Result<(), PipelineError> {
        Ok(self.cache.invalidate()?)
    }

    /// Re-embed the configured corpus unconditionally.
    pub async fn rebuild(&self) -> Result<IndexHandle, PipelineError> {
        Ok(self.cache.rebuild(&self.cfg.corpus_path).await?)
    }

    /// Chunk, embed and append ad-hoc texts to the live index. Returns the
    /// number of chunks added.
    pub async fn add_documents(
        &self,
        texts: &[String],
        sources: &[String],
    ) -> Result<usize, PipelineError> {
        if self.cache.current().is_none() {
            self.ensure_index().await?;
        }
        Ok(self.cache.add_documents(texts, sources).await?)
    }

    pub fn cache_info(&self) -> Result<CacheInfo, PipelineError> {
        Ok(self.cache.cache_info(&self.cfg.corpus_path)?)
    }

    /// Retrieve and score context for `query`.
    ///
    /// An index that cannot be ensured falls back to the last live index; with
    /// none available the result is an empty set with confidence `0.0`.
    pub async fn build_context(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: usize,
        threshold: f32,
    ) -> ContextSet {
        let span = tracing::span!(
            Level::INFO,
            "ragctx.build_context",
            owner = scope.owner.as_deref().unwrap_or(""),
            limit
        );
        async {
            let start = Instant::now();
            let ctx = match self.ready_assembler().await {
                Some(assembler) => assembler.build_context(query, scope, limit, threshold).await,
                None => ContextSet::empty(),
            };
            if let Some(recorder) = metrics_recorder() {
                recorder.record_build_context(start.elapsed(), ctx.len(), ctx.confidence_score);
            }
            info!(
                documents = ctx.len(),
                confidence = ctx.confidence_score,
                elapsed_micros = start.elapsed().as_micros(),
                "pipeline_build_context"
            );
            ctx
        }
        .instrument(span)
        .await
    }

    /// [`build_context`](Self::build_context) with the configured cap and
    /// threshold.
    pub async fn build_context_default(&self, query: &str, scope: &SearchScope) -> ContextSet {
        self.build_context(
            query,
            scope,
            self.cfg.assembler.max_context_documents,
            self.cfg.search.threshold,
        )
        .await
    }

    /// Context with `window` neighbouring chunks attached to each document.
    pub async fn build_contextual_context(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: usize,
        threshold: f32,
        window: usize,
    ) -> ContextualSet {
        match self.ready_assembler().await {
            Some(assembler) => {
                assembler
                    .build_contextual_context(query, scope, limit, threshold, window)
                    .await
            }
            None => ContextualSet::default(),
        }
    }

    /// Context whose threshold is derived from the candidate scores.
    pub async fn build_adaptive_context(
        &self,
        query: &str,
        scope: &SearchScope,
        max_docs: usize,
    ) -> AdaptiveContext {
        match self.ready_assembler().await {
            Some(assembler) => assembler.build_adaptive_context(query, scope, max_docs).await,
            None => AdaptiveContext::default(),
        }
    }

    /// Assembler over the current index. An index that cannot be ensured
    /// falls back to the last live one.
    async fn ready_assembler(&self) -> Option<ContextAssembler> {
        let handle = match self.ensure_index().await {
            Ok(ensured) => Some(ensured.handle),
            Err(err) => {
                warn!(error = %err, "ensure_index_failed");
                self.cache.current()
            }
        }?;
        self.assembler(handle)
            .map_err(|err| warn!(error = %err, "assembler_setup_failed"))
            .ok()
    }

    fn assembler(&self, handle: IndexHandle) -> Result<ContextAssembler, MatchError> {
        let store: Arc<dyn VectorStore> = handle;
        let search = SimilaritySearch::new(store, self.cfg.search)?;
        ContextAssembler::new(Arc::clone(&self.provider), search, self.cfg.assembler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn pipeline(dir: &TempDir) -> Pipeline {
        let corpus = dir.path().join("corpus");
        fs::create_dir_all(&corpus).unwrap();
        fs::write(corpus.join("notes.txt"), "the boat leaves at noon on saturday").unwrap();

        let cfg = RagConfig::default()
            .with_corpus_path(&corpus)
            .with_index(IndexCacheConfig::default().with_cache_dir(dir.path().join("cache")))
            .with_search(SearchConfig::default().with_threshold(0.0));
        Pipeline::with_provider(cfg, Arc::new(EmbeddingProvider::hash_only(32))).unwrap()
    }

    #[tokio::test]
    async fn identical_query_retrieves_its_document() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir);

        let ctx = pipeline
            .build_context("the boat leaves at noon on saturday", &SearchScope::general(), 5, 0.9)
            .await;
        assert_eq!(ctx.len(), 1);
        assert!(ctx.documents[0].similarity_score > 0.99);
        assert_eq!(ctx.query_tier, Some(EmbeddingTier::Hash));
    }

    #[tokio::test]
    async fn missing_corpus_yields_empty_context() {
        let dir = TempDir::new().unwrap();
        let cfg = RagConfig::default()
            .with_corpus_path(dir.path().join("nope"))
            .with_index(IndexCacheConfig::default().with_cache_dir(dir.path().join("cache")));
        let pipeline =
            Pipeline::with_provider(cfg, Arc::new(EmbeddingProvider::hash_only(8))).unwrap();

        let ctx = pipeline.build_context("anything", &SearchScope::general(), 5, 0.0).await;
        assert!(ctx.is_empty());
        assert_eq!(ctx.confidence_score, 0.0);
    }

    #[tokio::test]
    async fn add_documents_builds_index_first() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir);
        let added = pipeline
            .add_documents(&["remember the umbrella".to_string()], &[])
            .await
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(pipeline.cache().document_count(), 2);
    }

    #[tokio::test]
    async fn contextual_and_adaptive_entry_points() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir);
        let query = "the boat leaves at noon on saturday";

        let contextual = pipeline
            .build_contextual_context(query, &SearchScope::general(), 5, 0.9, 2)
            .await;
        assert_eq!(contextual.documents.len(), 1);
        // A single-chunk source has no neighbours.
        assert!(!contextual.documents[0].has_context());

        let adaptive = pipeline.build_adaptive_context(query, &SearchScope::general(), 3).await;
        assert_eq!(adaptive.context.len(), 1);
        assert_eq!(adaptive.candidates, 1);
    }

    #[test]
    fn error_display_and_source() {
        let err = PipelineError::from(IndexError::NotBuilt);
        assert!(err.to_string().starts_with("vector index failure"));
        assert!(err.source().is_some());
    }
}
