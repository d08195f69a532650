use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use index::ScoredDocument;
use semantic::EmbeddingProvider;
use tracing::{info, Instrument, Level};

use crate::search::SimilaritySearch;
use crate::types::{
    AdaptiveContext, AssemblerConfig, ContextSet, ContextualDocument, ContextualSet, MatchError,
    SearchScope,
};

const QUALITY_WEIGHT: f32 = 0.7;
const SUFFICIENCY_WEIGHT: f32 = 0.3;
/// Document count at which the sufficiency term saturates.
const SUFFICIENT_DOCUMENTS: f32 = 10.0;
/// Adaptive retrieval scores this many candidates per returned document.
const OVERFETCH_FACTOR: usize = 3;
/// Best-candidate similarity above which a match counts as strong.
const STRONG_MATCH: f32 = 0.7;
/// Best-candidate similarity above which a match counts as usable.
const USABLE_MATCH: f32 = 0.4;

/// Embeds a query, searches, and packages the ranked result with a
/// confidence score.
pub struct ContextAssembler {
    provider: Arc<EmbeddingProvider>,
    search: SimilaritySearch,
    cfg: AssemblerConfig,
}

impl ContextAssembler {
    pub fn new(
        provider: Arc<EmbeddingProvider>,
        search: SimilaritySearch,
        cfg: AssemblerConfig,
    ) -> Result<Self, MatchError> {
        cfg.validate()?;
        Ok(Self {
            provider,
            search,
            cfg,
        })
    }

    pub fn search(&self) -> &SimilaritySearch {
        &self.search
    }

    /// Build the context for `query_text`.
    ///
    /// `limit` is capped at `max_context_documents`. Never fails: a blank
    /// query or a search that finds nothing yields an empty set with
    /// confidence `0.0`.
    pub async fn build_context(
        &self,
        query_text: &str,
        scope: &SearchScope,
        limit: usize,
        threshold: f32,
    ) -> ContextSet {
        let span = tracing::span!(
            Level::INFO,
            "matcher.build_context",
            owner = scope.owner.as_deref().unwrap_or(""),
            limit,
        );
        async {
            let start = Instant::now();
            let limit = limit.min(self.cfg.max_context_documents);

            let query = self.provider.embed(query_text).await;
            if query.is_zero() || limit == 0 {
                info!(tier = %query.tier, "build_context_empty_query");
                return ContextSet {
                    query_tier: Some(query.tier),
                    ..ContextSet::empty()
                };
            }

            let outcome = self
                .search
                .search_detailed(&query.vector, scope, limit, threshold);
            let mut documents = outcome.documents;
            if self.cfg.dedup_by_content {
                documents = dedup_by_content(documents);
            }
            documents.truncate(limit);

            let confidence_score = confidence_score(&documents);
            info!(
                documents = documents.len(),
                confidence = confidence_score,
                tier = %query.tier,
                used_fallback = outcome.used_fallback,
                elapsed_micros = start.elapsed().as_micros(),
                "build_context_success"
            );
            ContextSet {
                documents,
                confidence_score,
                query_tier: Some(query.tier),
                used_fallback: outcome.used_fallback,
            }
        }
        .instrument(span)
        .await
    }

    /// [`build_context`](Self::build_context) with the configured threshold
    /// and document cap.
    pub async fn build_context_default(&self, query_text: &str, scope: &SearchScope) -> ContextSet {
        self.build_context(
            query_text,
            scope,
            self.cfg.max_context_documents,
            self.search.config().threshold,
        )
        .await
    }
}

impl ContextAssembler {
    /// [`build_context`](Self::build_context), with each document carrying up
    /// to `window` neighbouring chunks on either side from its source.
    pub async fn build_contextual_context(
        &self,
        query_text: &str,
        scope: &SearchScope,
        limit: usize,
        threshold: f32,
        window: usize,
    ) -> ContextualSet {
        let ctx = self.build_context(query_text, scope, limit, threshold).await;
        let documents: Vec<ContextualDocument> = ctx
            .documents
            .into_iter()
            .map(|scored| ContextualDocument {
                neighbours: self.search.neighbours(&scored.document, window),
                scored,
            })
            .collect();
        info!(
            documents = documents.len(),
            with_context = documents.iter().filter(|d| d.has_context()).count(),
            window,
            "build_contextual_context_success"
        );
        ContextualSet {
            documents,
            confidence_score: ctx.confidence_score,
            query_tier: ctx.query_tier,
            used_fallback: ctx.used_fallback,
        }
    }

    /// Retrieve without a caller threshold. Scores `3 * max_docs` candidates
    /// at threshold `0.0`, derives a cut-off from their distribution with
    /// [`adaptive_threshold`] and keeps at most `max_docs` above it.
    pub async fn build_adaptive_context(
        &self,
        query_text: &str,
        scope: &SearchScope,
        max_docs: usize,
    ) -> AdaptiveContext {
        let span = tracing::span!(
            Level::INFO,
            "matcher.build_adaptive_context",
            owner = scope.owner.as_deref().unwrap_or(""),
            max_docs,
        );
        async {
            let start = Instant::now();
            let max_docs = max_docs.min(self.cfg.max_context_documents);

            let query = self.provider.embed(query_text).await;
            if query.is_zero() || max_docs == 0 {
                return AdaptiveContext {
                    context: ContextSet {
                        query_tier: Some(query.tier),
                        ..ContextSet::empty()
                    },
                    ..AdaptiveContext::default()
                };
            }

            let fetch = max_docs.saturating_mul(OVERFETCH_FACTOR);
            let outcome = self.search.search_detailed(&query.vector, scope, fetch, 0.0);
            let candidates = outcome.documents.len();
            let scores: Vec<f32> = outcome.documents.iter().map(|d| d.similarity_score).collect();
            let threshold = adaptive_threshold(&scores);

            let mut documents: Vec<ScoredDocument> = outcome
                .documents
                .into_iter()
                .filter(|d| d.similarity_score >= threshold)
                .collect();
            if self.cfg.dedup_by_content {
                documents = dedup_by_content(documents);
            }
            documents.truncate(max_docs);

            let confidence_score = confidence_score(&documents);
            info!(
                candidates,
                documents = documents.len(),
                threshold,
                confidence = confidence_score,
                elapsed_micros = start.elapsed().as_micros(),
                "build_adaptive_context_success"
            );
            AdaptiveContext {
                context: ContextSet {
                    documents,
                    confidence_score,
                    query_tier: Some(query.tier),
                    used_fallback: outcome.used_fallback,
                },
                threshold,
                candidates,
            }
        }
        .instrument(span)
        .await
    }
}

/// Cut-off for adaptive retrieval, from candidate similarities.
///
/// With a strong best match (above 0.7) only candidates half a standard
/// deviation above the mean survive; with a usable one (above 0.4) the mean
/// is the cut; otherwise half a deviation below the mean, so weak corpora
/// still yield something. Clamped to `[0, 1]`; `0.0` for no candidates.
pub fn adaptive_threshold(scores: &[f32]) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    let n = scores.len() as f32;
    let mean = scores.iter().sum::<f32>() / n;
    let std = (scores.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / n).sqrt();
    let best = scores.iter().copied().fold(f32::MIN, f32::max);

    let threshold = if best > STRONG_MATCH {
        mean + 0.5 * std
    } else if best > USABLE_MATCH {
        mean
    } else {
        mean - 0.5 * std
    };
    if threshold.is_finite() {
        threshold.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Keep the first (highest-ranked) document for each content fingerprint.
/// Input must already be sorted best first.
pub fn dedup_by_content(documents: Vec<ScoredDocument>) -> Vec<ScoredDocument> {
    let mut seen = HashSet::with_capacity(documents.len());
    documents
        .into_iter()
        .filter(|d| seen.insert(d.document.content_fingerprint()))
        .collect()
}

/// `0.7 * mean similarity + 0.3 * min(n / 10, 1)`, clamped to `[0, 1]`;
/// `0.0` for no documents.
pub fn confidence_score(documents: &[ScoredDocument]) -> f32 {
    if documents.is_empty() {
        return 0.0;
    }
    let n = documents.len() as f32;
    let mean = documents.iter().map(|d| d.similarity_score).sum::<f32>() / n;
    let sufficiency = (n / SUFFICIENT_DOCUMENTS).min(1.0);
    let score = QUALITY_WEIGHT * mean + SUFFICIENCY_WEIGHT * sufficiency;
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Human label for a confidence score.
pub fn quality_level(score: f32) -> &'static str {
    if score > 0.8 {
        "excellent"
    } else if score > 0.6 {
        "good"
    } else if score > 0.4 {
        "fair"
    } else {
        "poor"
    }
}
