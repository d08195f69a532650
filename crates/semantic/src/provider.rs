//! The tiered embedding service.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn, Instrument, Level};

use crate::dimension::fit_to_dimension;
use crate::hash::{hash_embedding, HASH_MODEL_NAME};
use crate::local::LocalModel;
use crate::remote::{HttpEmbedder, RemoteEmbedder};
use crate::{EmbeddingTier, PadStrategy, SemanticConfig, SemanticEmbedding, SemanticError};

/// Turns text into fixed-width vectors, trying the local model, then the
/// remote service, then the hash fallback.
///
/// The provider is an ordinary value: build one at startup and share it
/// (behind an `Arc`) with everything that embeds. It owns the lazily
/// initialised local model and the remote endpoint state, so two providers
/// never share hidden globals beyond the per-thread ONNX session cache.
///
/// [`embed`](Self::embed) and [`embed_batch`](Self::embed_batch) never fail.
pub struct EmbeddingProvider {
    dimension: usize,
    pad_strategy: PadStrategy,
    pad_noise: f32,
    local: Option<Arc<dyn LocalModel>>,
    remote: Option<Arc<dyn RemoteEmbedder>>,
}

impl std::fmt::Debug for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingProvider")
            .field("dimension", &self.dimension)
            .field("pad_strategy", &self.pad_strategy)
            .field("local", &self.local.as_ref().map(|m| m.model_name().to_string()))
            .field("remote", &self.remote.as_ref().map(|r| r.name().to_string()))
            .finish()
    }
}

impl EmbeddingProvider {
    /// Build the tiers described by `cfg`.
    ///
    /// A configured local model is ignored (with a warning) when the crate is
    /// built without the `onnx` feature.
    pub fn new(cfg: SemanticConfig) -> Result<Self, SemanticError> {
        cfg.validate()?;
        let mut provider = Self::hash_only(cfg.dimension)
            .with_pad_strategy(cfg.pad_strategy, cfg.pad_noise);

        if let Some(local_cfg) = cfg.local {
            #[cfg(feature = "onnx")]
            {
                let model = crate::local::OnnxModel::new(local_cfg)?;
                provider = provider.with_local(Arc::new(model));
            }
            #[cfg(not(feature = "onnx"))]
            {
                warn!(
                    model = %local_cfg.model_name,
                    "local model configured but onnx support is disabled"
                );
            }
        }

        if cfg.remote.enabled {
            provider = provider.with_remote(Arc::new(HttpEmbedder::new(cfg.remote)?));
        }
        Ok(provider)
    }

    /// Provider with only the hash tier.
    pub fn hash_only(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            pad_strategy: PadStrategy::default(),
            pad_noise: 0.01,
            local: None,
            remote: None,
        }
    }

    pub fn with_local(mut self, model: Arc<dyn LocalModel>) -> Self {
        self.local = Some(model);
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteEmbedder>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_pad_strategy(mut self, strategy: PadStrategy, noise: f32) -> Self {
        self.pad_strategy = strategy;
        self.pad_noise = noise;
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Tier expected to serve every non-blank text while all backends are
    /// healthy.
    pub fn head_tier(&self) -> EmbeddingTier {
        if self.local.is_some() {
            EmbeddingTier::Local
        } else if self.remote.is_some() {
            EmbeddingTier::Remote
        } else {
            EmbeddingTier::Hash
        }
    }

    /// Identifier of the active model chain, e.g. `all-MiniLM-L6-v2@1536`.
    ///
    /// Snapshots built under a different id must not be reused.
    pub fn model_id(&self) -> String {
        let head = self
            .local
            .as_ref()
            .map(|m| m.model_name().to_string())
            .or_else(|| self.remote.as_ref().map(|r| r.name().to_string()))
            .unwrap_or_else(|| HASH_MODEL_NAME.to_string());
        format!("{head}@{}", self.dimension)
    }

    /// Embed one text.
    pub async fn embed(&self, text: &str) -> SemanticEmbedding {
        self.embed_batch(&[text])
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| self.hash_tier(text))
    }

    /// Embed many texts, one result per input in input order.
    ///
    /// The local model gets every non-empty text in one call. Items it fails
    /// on move to the remote tier as a batch, and whatever is still missing
    /// gets a hash vector. A successful item is never dropped because a
    /// sibling failed.
    pub async fn embed_batch<S>(&self, texts: &[S]) -> Vec<SemanticEmbedding>
    where
        S: AsRef<str> + Sync,
    {
        let span = tracing::span!(Level::INFO, "semantic.embed_batch", batch = texts.len());
        self.embed_batch_inner(texts).instrument(span).await
    }

    async fn embed_batch_inner<S>(&self, texts: &[S]) -> Vec<SemanticEmbedding>
    where
        S: AsRef<str> + Sync,
    {
        let start = Instant::now();
        let mut slots: Vec<Option<SemanticEmbedding>> = texts
            .iter()
            .map(|t| {
                t.as_ref()
                    .trim()
                    .is_empty()
                    .then(|| self.empty_embedding())
            })
            .collect();
        let mut pending: Vec<usize> = (0..texts.len()).filter(|&i| slots[i].is_none()).collect();

        if let Some(local) = &self.local {
            if !pending.is_empty() {
                self.run_local(local.as_ref(), texts, &pending, &mut slots).await;
                pending.retain(|&i| slots[i].is_none());
            }
        }
        let after_local = pending.len();

        if let Some(remote) = &self.remote {
            if !pending.is_empty() {
                self.run_remote(remote.as_ref(), texts, &pending, &mut slots).await;
                pending.retain(|&i| slots[i].is_none());
            }
        }

        info!(
            local = texts.len() - after_local - count_tier(&slots, EmbeddingTier::Empty),
            remote = after_local - pending.len(),
            hash = pending.len(),
            elapsed_micros = start.elapsed().as_micros(),
            "embed_batch_complete"
        );

        slots
            .into_iter()
            .zip(texts)
            .map(|(slot, text)| slot.unwrap_or_else(|| self.hash_tier(text.as_ref())))
            .collect()
    }

    async fn run_local<S: AsRef<str>>(
        &self,
        local: &dyn LocalModel,
        texts: &[S],
        pending: &[usize],
        slots: &mut [Option<SemanticEmbedding>],
    ) {
        let inputs: Vec<String> = pending.iter().map(|&i| texts[i].as_ref().to_string()).collect();
        match local.embed_batch(&inputs).await {
            Ok(vectors) if vectors.len() == inputs.len() => {
                for (&i, raw) in pending.iter().zip(vectors) {
                    slots[i] = self.accept(raw, EmbeddingTier::Local, local.model_name());
                }
            }
            Ok(vectors) => {
                warn!(
                    tier = "local",
                    expected = inputs.len(),
                    got = vectors.len(),
                    "embed_tier_failed"
                );
            }
            Err(err) if err.is_unavailable() || inputs.len() == 1 => {
                warn!(tier = "local", error = %err, "embed_tier_failed");
            }
            Err(err) => {
                // One bad input can sink a whole batch; isolate it.
                warn!(tier = "local", error = %err, "embed_batch_retry_per_item");
                for (&i, input) in pending.iter().zip(inputs) {
                    match local.embed_batch(std::slice::from_ref(&input)).await {
                        Ok(mut vectors) if vectors.len() == 1 => {
                            let raw = vectors.pop().unwrap_or_default();
                            slots[i] = self.accept(raw, EmbeddingTier::Local, local.model_name());
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(tier = "local", index = i, error = %err, "embed_tier_failed");
                        }
                    }
                }
            }
        }
    }

    async fn run_remote<S: AsRef<str>>(
        &self,
        remote: &dyn RemoteEmbedder,
        texts: &[S],
        pending: &[usize],
        slots: &mut [Option<SemanticEmbedding>],
    ) {
        let inputs: Vec<String> = pending.iter().map(|&i| texts[i].as_ref().to_string()).collect();
        match remote.embed_batch(&inputs).await {
            Ok(batch) if batch.vectors.len() == inputs.len() => {
                for (&i, raw) in pending.iter().zip(batch.vectors) {
                    slots[i] = self.accept(raw, EmbeddingTier::Remote, &batch.model);
                }
            }
            Ok(batch) => {
                warn!(
                    tier = "remote",
                    expected = inputs.len(),
                    got = batch.vectors.len(),
                    "embed_tier_failed"
                );
            }
            Err(err) => {
                warn!(tier = "remote", error = %err, "embed_tier_failed");
            }
        }
    }

    /// Fit a tier's raw output, rejecting empty or non-finite vectors.
    fn accept(&self, raw: Vec<f32>, tier: EmbeddingTier, model: &str) -> Option<SemanticEmbedding> {
        if raw.is_empty() || raw.iter().any(|x| !x.is_finite()) {
            warn!(tier = tier.as_str(), len = raw.len(), "embed_vector_rejected");
            return None;
        }
        let source_dim = raw.len();
        Some(SemanticEmbedding {
            vector: fit_to_dimension(raw, self.dimension, self.pad_strategy, self.pad_noise),
            model_name: model.to_string(),
            tier,
            source_dim,
            embedding_dim: self.dimension,
        })
    }

    fn hash_tier(&self, text: &str) -> SemanticEmbedding {
        if text.trim().is_empty() {
            return self.empty_embedding();
        }
        SemanticEmbedding {
            vector: hash_embedding(text, self.dimension),
            model_name: HASH_MODEL_NAME.to_string(),
            tier: EmbeddingTier::Hash,
            source_dim: self.dimension,
            embedding_dim: self.dimension,
        }
    }

    fn empty_embedding(&self) -> SemanticEmbedding {
        SemanticEmbedding {
            vector: vec![0.0; self.dimension],
            model_name: String::new(),
            tier: EmbeddingTier::Empty,
            source_dim: 0,
            embedding_dim: self.dimension,
        }
    }
}

fn count_tier(slots: &[Option<SemanticEmbedding>], tier: EmbeddingTier) -> usize {
    slots
        .iter()
        .filter(|s| s.as_ref().is_some_and(|e| e.tier == tier))
        .count()
}
