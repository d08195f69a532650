use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use ingest::{chunk_documents, document_id, load_documents, ChunkingConfig, CorpusConfig, Document};
use semantic::{EmbeddingProvider, EmbeddingTier};
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument, Level};

use crate::fingerprint::corpus_fingerprint;
use crate::snapshot::{CompressionConfig, SnapshotFile, SnapshotMeta, SnapshotStore};
use crate::{IndexError, VectorIndex};

/// Shared, read-only view of a built index.
pub type IndexHandle = Arc<VectorIndex>;

/// Configuration for [`VectorIndexCache`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexCacheConfig {
    /// Where snapshot files live.
    pub cache_dir: PathBuf,
    pub compression: CompressionConfig,
    /// Texts per `embed_batch` call during a rebuild.
    pub embed_batch_size: usize,
    pub corpus: CorpusConfig,
    /// How long an index built while the head embedding tier was failing is
    /// served before the next `ensure` tries to rebuild it.
    pub degraded_retry_secs: u64,
}

impl Default for IndexCacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache/vector_index"),
            compression: CompressionConfig::default(),
            embed_batch_size: 64,
            corpus: CorpusConfig::default(),
            degraded_retry_secs: 300,
        }
    }
}

impl IndexCacheConfig {
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_corpus(mut self, corpus: CorpusConfig) -> Self {
        self.corpus = corpus;
        self
    }

    pub fn with_embed_batch_size(mut self, size: usize) -> Self {
        self.embed_batch_size = size;
        self
    }

    pub fn with_degraded_retry_secs(mut self, secs: u64) -> Self {
        self.degraded_retry_secs = secs;
        self
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(IndexError::InvalidConfig("cache_dir must not be empty".into()));
        }
        if self.embed_batch_size == 0 {
            return Err(IndexError::InvalidConfig(
                "embed_batch_size must be greater than zero".into(),
            ));
        }
        if !(1..=22).contains(&self.compression.level) {
            return Err(IndexError::InvalidConfig(format!(
                "compression level {} outside 1..=22",
                self.compression.level
            )));
        }
        self.corpus.validate()?;
        Ok(())
    }
}

/// Where [`VectorIndexCache::ensure`] got its index from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSource {
    /// The index already held in memory was still current.
    Live,
    /// A persisted snapshot matched the corpus and model.
    Snapshot,
    /// The corpus was re-embedded.
    Rebuilt,
}

#[derive(Debug, Clone)]
pub struct Ensured {
    pub handle: IndexHandle,
    pub source: IndexSource,
    pub fingerprint: String,
}

/// State of the cache for one corpus, as reported by
/// [`VectorIndexCache::cache_info`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub corpus_root: PathBuf,
    pub fingerprint: String,
    pub model_id: String,
    /// A snapshot exists for the current fingerprint and model.
    pub snapshot_valid: bool,
    pub meta: Option<SnapshotMeta>,
    pub files: Vec<SnapshotFile>,
    /// Documents in the in-memory index, if one is loaded.
    pub live_documents: Option<usize>,
    /// Whether the in-memory index holds vectors from a fallback tier.
    pub live_degraded: Option<bool>,
}

#[derive(Debug, Clone)]
struct LiveIndex {
    root: PathBuf,
    fingerprint: String,
    /// Provider model id the index was requested under.
    model_id: String,
    /// Models that actually produced the stored vectors.
    models: BTreeSet<String>,
    degraded: bool,
    built_at: Instant,
    index: IndexHandle,
}

/// Which models embedded a batch of documents, and whether any of them came
/// from a tier below the provider's head tier.
#[derive(Debug, Default)]
struct EmbedUsage {
    models: BTreeSet<String>,
    degraded: bool,
}

impl EmbedUsage {
    fn merge(mut self, other: EmbedUsage) -> Self {
        self.models.extend(other.models);
        self.degraded |= other.degraded;
        self
    }
}

/// Builds, persists and reuses the vector index for a corpus.
///
/// The cache key is the corpus fingerprint plus the provider's model id; a
/// change to either means a full rebuild. When some documents were embedded
/// by a fallback tier, the snapshot is stored under a `degraded:` id naming
/// the models actually used, so no later run accepts it as a full index. The
/// degraded in-memory index is served for `degraded_retry_secs` and then
/// rebuilt. The in-memory index is swapped
/// only after a rebuild has been persisted, so a failed rebuild leaves both
/// the previous handle and the previous snapshot in place.
///
/// Concurrent rebuilds of the same corpus are not coordinated. They do the
/// same work twice and the last one to finish wins.
pub struct VectorIndexCache {
    cfg: IndexCacheConfig,
    provider: Arc<EmbeddingProvider>,
    snapshots: SnapshotStore,
    live: RwLock<Option<LiveIndex>>,
}

impl VectorIndexCache {
    pub fn new(cfg: IndexCacheConfig, provider: Arc<EmbeddingProvider>) -> Result<Self, IndexError> {
        cfg.validate()?;
        let snapshots = SnapshotStore::new(cfg.cache_dir.clone(), cfg.compression);
        Ok(Self {
            cfg,
            provider,
            snapshots,
            live: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &IndexCacheConfig {
        &self.cfg
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Current index for `corpus_root`, reusing what is still valid.
    pub async fn ensure_index(&self, corpus_root: &Path) -> Result<IndexHandle, IndexError> {
        Ok(self.ensure(corpus_root).await?.handle)
    }

    /// Like [`ensure_index`](Self::ensure_index), also reporting where the
    /// index came from.
    pub async fn ensure(&self, corpus_root: &Path) -> Result<Ensured, IndexError> {
        let span = tracing::span!(
            Level::INFO,
            "index.ensure_index",
            corpus = %corpus_root.display()
        );
        self.ensure_inner(corpus_root).instrument(span).await
    }

    async fn ensure_inner(&self, corpus_root: &Path) -> Result<Ensured, IndexError> {
        let start = Instant::now();
        let fingerprint = corpus_fingerprint(corpus_root, &self.cfg.corpus)?;
        let model_id = self.provider.model_id();

        if let Some(handle) = self.live_for(corpus_root, &fingerprint, &model_id)? {
            return Ok(Ensured {
                handle,
                source: IndexSource::Live,
                fingerprint,
            });
        }

        if let Some(index) = self.snapshots.load(&fingerprint, &model_id)? {
            let handle = Arc::new(index);
            let head = model_id.rsplit_once('@').map_or(model_id.as_str(), |(m, _)| m);
            let usage = EmbedUsage {
                models: BTreeSet::from([head.to_string()]),
                degraded: false,
            };
            self.set_live(corpus_root, &fingerprint, &model_id, usage, Arc::clone(&handle))?;
            info!(
                documents = handle.len(),
                elapsed_micros = start.elapsed().as_micros(),
                "ensure_index_cache_hit"
            );
            return Ok(Ensured {
                handle,
                source: IndexSource::Snapshot,
                fingerprint,
            });
        }

        let handle = self.build(corpus_root, &fingerprint, &model_id).await?;
        info!(
            documents = handle.len(),
            elapsed_micros = start.elapsed().as_micros(),
            "ensure_index_rebuilt"
        );
        Ok(Ensured {
            handle,
            source: IndexSource::Rebuilt,
            fingerprint,
        })
    }

    /// Re-embed the corpus regardless of any cached state.
    pub async fn rebuild(&self, corpus_root: &Path) -> Result<IndexHandle, IndexError> {
        let span = tracing::span!(Level::INFO, "index.rebuild", corpus = %corpus_root.display());
        async {
            let start = Instant::now();
            let fingerprint = corpus_fingerprint(corpus_root, &self.cfg.corpus)?;
            let model_id = self.provider.model_id();
            let handle = self.build(corpus_root, &fingerprint, &model_id).await?;
            info!(
                documents = handle.len(),
                elapsed_micros = start.elapsed().as_micros(),
                "rebuild_success"
            );
            Ok::<_, IndexError>(handle)
        }
        .instrument(span)
        .await
    }

    /// Delete persisted snapshots and forget the in-memory index. Source
    /// documents are not touched.
    pub fn invalidate(&self) -> Result<(), IndexError> {
        let span = tracing::span!(Level::INFO, "index.invalidate");
        let _guard = span.enter();

        let removed = self.snapshots.remove_all()?;
        *self.live.write().map_err(|_| IndexError::backend("poisoned lock"))? = None;
        info!(removed, "invalidate_success");
        Ok(())
    }

    /// Chunk, embed and append ad-hoc texts to the live index, then persist it
    /// under the current key. `sources[i]` labels `texts[i]`; missing labels
    /// default to `"added"`. Returns the number of chunks added.
    pub async fn add_documents(
        &self,
        texts: &[String],
        sources: &[String],
    ) -> Result<usize, IndexError> {
        let span = tracing::span!(Level::INFO, "index.add_documents", texts = texts.len());
        async {
            let start = Instant::now();
            let live = self.read_live()?.ok_or(IndexError::NotBuilt)?;

            let chunking = ChunkingConfig::for_added_documents();
            let base = live.index.len();
            let mut docs = Vec::new();
            for (i, text) in texts.iter().enumerate() {
                let source = sources.get(i).map(String::as_str).unwrap_or("added");
                for mut doc in chunk_documents(text, source, &chunking) {
                    doc.id = document_id(
                        &self.cfg.corpus.doc_id_namespace,
                        source,
                        base + docs.len(),
                        None,
                    );
                    docs.push(doc);
                }
            }
            if docs.is_empty() {
                return Ok(0);
            }

            let usage = EmbedUsage {
                models: live.models.clone(),
                degraded: live.degraded,
            }
            .merge(self.embed_documents(&mut docs).await);
            let added = docs.len();
            let mut index = (*live.index).clone();
            index.extend(docs)?;

            let stored_id = self.stored_model_id(&live.model_id, &usage);
            self.snapshots.persist(&live.fingerprint, &stored_id, &index)?;
            self.set_live(&live.root, &live.fingerprint, &live.model_id, usage, Arc::new(index))?;
            info!(
                added,
                elapsed_micros = start.elapsed().as_micros(),
                "add_documents_success"
            );
            Ok::<_, IndexError>(added)
        }
        .instrument(span)
        .await
    }

    /// Documents in the live index, `0` before the first build.
    pub fn document_count(&self) -> usize {
        self.read_live()
            .ok()
            .flatten()
            .map(|live| live.index.len())
            .unwrap_or(0)
    }

    /// Current in-memory index, if any.
    pub fn current(&self) -> Option<IndexHandle> {
        self.read_live().ok().flatten().map(|live| live.index)
    }

    pub fn cache_info(&self, corpus_root: &Path) -> Result<CacheInfo, IndexError> {
        let fingerprint = corpus_fingerprint(corpus_root, &self.cfg.corpus)?;
        let model_id = self.provider.model_id();
        let live = self.read_live()?.filter(|live| live.root == corpus_root);
        let live_documents = live.as_ref().map(|live| live.index.len());
        let live_degraded = live.as_ref().map(|live| live.degraded);
        Ok(CacheInfo {
            corpus_root: corpus_root.to_path_buf(),
            snapshot_valid: self.snapshots.is_valid(&fingerprint, &model_id),
            meta: self.snapshots.read_meta(&fingerprint).unwrap_or(None),
            files: self.snapshots.files()?,
            live_documents,
            live_degraded,
            fingerprint,
            model_id,
        })
    }

    async fn build(
        &self,
        corpus_root: &Path,
        fingerprint: &str,
        model_id: &str,
    ) -> Result<IndexHandle, IndexError> {
        let mut docs = load_documents(corpus_root, &self.cfg.corpus)?;
        let usage = self.embed_documents(&mut docs).await;

        let mut index = VectorIndex::new(self.provider.dimension());
        index.extend(docs)?;
        let stored_id = self.stored_model_id(model_id, &usage);
        if usage.degraded {
            warn!(
                requested = model_id,
                stored = %stored_id,
                retry_secs = self.cfg.degraded_retry_secs,
                "index_built_degraded"
            );
        }
        self.snapshots.persist(fingerprint, &stored_id, &index)?;

        let handle = Arc::new(index);
        self.set_live(corpus_root, fingerprint, model_id, usage, Arc::clone(&handle))?;
        Ok(handle)
    }

    /// Fill `embedding` on every document. Blank documents keep `None` so
    /// they never become candidates.
    async fn embed_documents(&self, docs: &mut [Document]) -> EmbedUsage {
        let head = self.provider.head_tier();
        let mut usage = EmbedUsage::default();
        for batch in docs.chunks_mut(self.cfg.embed_batch_size) {
            let texts: Vec<String> = batch.iter().map(Document::index_text).collect();
            let embeddings = self.provider.embed_batch(&texts).await;
            for (doc, emb) in batch.iter_mut().zip(embeddings) {
                if emb.tier != EmbeddingTier::Empty {
                    usage.degraded |= emb.tier != head;
                    usage.models.insert(emb.model_name.clone());
                }
                doc.embedding = (!emb.is_zero()).then_some(emb.vector);
            }
        }
        usage
    }

    /// Id a snapshot is persisted under. A full index keeps the requested id;
    /// a degraded one never matches any provider's model id.
    fn stored_model_id(&self, model_id: &str, usage: &EmbedUsage) -> String {
        if !usage.degraded {
            return model_id.to_string();
        }
        let models: Vec<&str> = usage.models.iter().map(String::as_str).collect();
        format!("degraded:{}@{}", models.join("+"), self.provider.dimension())
    }

    fn live_for(
        &self,
        root: &Path,
        fingerprint: &str,
        model_id: &str,
    ) -> Result<Option<IndexHandle>, IndexError> {
        let retry = Duration::from_secs(self.cfg.degraded_retry_secs);
        Ok(self.read_live()?.and_then(|live| {
            let fresh = !live.degraded || live.built_at.elapsed() < retry;
            (live.root == root
                && live.fingerprint == fingerprint
                && live.model_id == model_id
                && fresh)
                .then_some(live.index)
        }))
    }

    fn read_live(&self) -> Result<Option<LiveIndex>, IndexError> {
        Ok(self
            .live
            .read()
            .map_err(|_| IndexError::backend("poisoned lock"))?
            .clone())
    }

    fn set_live(
        &self,
        root: &Path,
        fingerprint: &str,
        model_id: &str,
        usage: EmbedUsage,
        index: IndexHandle,
    ) -> Result<(), IndexError> {
        *self
            .live
            .write()
            .map_err(|_| IndexError::backend("poisoned lock"))? = Some(LiveIndex {
            root: root.to_path_buf(),
            fingerprint: fingerprint.to_string(),
            model_id: model_id.to_string(),
            models: usage.models,
            degraded: usage.degraded,
            built_at: Instant::now(),
            index,
        });
        Ok(())
    }
}
