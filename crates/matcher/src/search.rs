use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use index::{Document, ScoredDocument, VectorStore};
use tracing::{debug, info, warn, Level};

use crate::types::{MatchError, SearchConfig, SearchOutcome, SearchScope};

/// Nearest-neighbour search over a primary store with backfill from a general
/// store.
///
/// The primary query honours the scope's owner. When it returns fewer than
/// `floor(limit * fallback_ratio)` documents, the general store fills the
/// remaining slots under a relaxed threshold and both lists are merged by
/// score. The general store defaults to the primary queried for every other
/// owner. Speaker and mood filters on the scope apply to both queries.
///
/// A store that errors contributes nothing; search itself never fails.
#[derive(Clone)]
pub struct SimilaritySearch {
    primary: Arc<dyn VectorStore>,
    secondary: Option<Arc<dyn VectorStore>>,
    cfg: SearchConfig,
}

impl std::fmt::Debug for SimilaritySearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilaritySearch")
            .field("primary", &self.primary.name())
            .field("secondary", &self.secondary.as_ref().map(|s| s.name()))
            .field("cfg", &self.cfg)
            .finish()
    }
}

impl SimilaritySearch {
    pub fn new(primary: Arc<dyn VectorStore>, cfg: SearchConfig) -> Result<Self, MatchError> {
        cfg.validate()?;
        Ok(Self {
            primary,
            secondary: None,
            cfg,
        })
    }

    /// Use a separate store for backfill instead of the unfiltered primary.
    pub fn with_secondary(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.secondary = Some(store);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.cfg
    }

    /// Up to `limit` documents at or above `threshold`, best first.
    pub fn search(
        &self,
        query: &[f32],
        scope: &SearchScope,
        limit: usize,
        threshold: f32,
    ) -> Vec<ScoredDocument> {
        self.search_detailed(query, scope, limit, threshold).documents
    }

    /// [`search`](Self::search), also reporting whether backfill ran.
    pub fn search_detailed(
        &self,
        query: &[f32],
        scope: &SearchScope,
        limit: usize,
        threshold: f32,
    ) -> SearchOutcome {
        let span = tracing::span!(
            Level::INFO,
            "matcher.search",
            owner = scope.owner.as_deref().unwrap_or(""),
            limit,
            threshold
        );
        let _guard = span.enter();
        let start = Instant::now();

        if limit == 0 || query.is_empty() || !threshold.is_finite() {
            return SearchOutcome::default();
        }

        let primary = self.query_primary(query, scope, limit, threshold);
        let primary_hits = primary.len();

        let mut merged = primary;
        let mut used_fallback = false;
        if primary_hits < self.fallback_floor(limit) {
            if let Some(store) = self.backfill_store(scope) {
                let relaxed = threshold * self.cfg.relaxed_factor;
                let remaining = limit - primary_hits;
                debug!(primary_hits, remaining, relaxed, "search_backfill");
                merged.extend(self.query_backfill(store, query, scope, remaining, relaxed));
                used_fallback = true;
            }
        }

        // Stable: ties keep primary-before-secondary and store order.
        merged.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(Ordering::Equal)
        });
        merged.truncate(limit);

        info!(
            primary_hits,
            returned = merged.len(),
            used_fallback,
            elapsed_micros = start.elapsed().as_micros(),
            "search_success"
        );
        SearchOutcome {
            documents: merged,
            primary_hits,
            used_fallback,
        }
    }

    /// Same-source neighbours of `doc` within `window` positions, from the
    /// first store that knows the source. Lookup failures yield none.
    pub fn neighbours(&self, doc: &Document, window: usize) -> Vec<Document> {
        if window == 0 {
            return Vec::new();
        }
        let stores = std::iter::once(self.primary.as_ref()).chain(self.secondary.as_deref());
        for store in stores {
            match store.neighbours(&doc.source, doc.message_index, window) {
                Ok(found) if !found.is_empty() => return found,
                Ok(_) => {}
                Err(err) => {
                    warn!(store = store.name(), error = %err, "neighbour_lookup_failed");
                }
            }
        }
        Vec::new()
    }

    /// Primary hits below this count trigger backfill:
    /// `floor(limit * fallback_ratio)`, so limit 5 backfills below 2 hits.
    fn fallback_floor(&self, limit: usize) -> usize {
        (limit as f32 * self.cfg.fallback_ratio).floor() as usize
    }

    fn query_primary(
        &self,
        query: &[f32],
        scope: &SearchScope,
        limit: usize,
        threshold: f32,
    ) -> Vec<ScoredDocument> {
        let store = self.primary.as_ref();
        if !scope.filters_attributes() {
            return query_store(store, "primary", query, scope.owner.as_deref(), limit, threshold);
        }
        let owner = scope.owner.as_deref();
        let keep = |doc: &Document| {
            owner.map_or(true, |o| doc.owner.as_deref() == Some(o)) && scope.admits(doc)
        };
        query_store_where(store, "primary", query, &keep, limit, threshold)
    }

    /// Backfill query. The implicit general store is the primary itself, so
    /// the scope owner's documents are excluded there; they were already
    /// offered to the primary query and would only take backfill slots.
    fn query_backfill(
        &self,
        store: &dyn VectorStore,
        query: &[f32],
        scope: &SearchScope,
        limit: usize,
        threshold: f32,
    ) -> Vec<ScoredDocument> {
        let excluded = match self.secondary {
            Some(_) => None,
            None => scope.owner.as_deref(),
        };
        if excluded.is_none() && !scope.filters_attributes() {
            return query_store(store, "secondary", query, None, limit, threshold);
        }
        let keep = |doc: &Document| {
            excluded.map_or(true, |o| doc.owner.as_deref() != Some(o)) && scope.admits(doc)
        };
        query_store_where(store, "secondary", query, &keep, limit, threshold)
    }

    /// Store used to backfill a sparse primary result, if any applies.
    ///
    /// An unscoped query against the implicit general store would repeat the
    /// primary query, so there is nothing to backfill.
    fn backfill_store(&self, scope: &SearchScope) -> Option<&dyn VectorStore> {
        if !scope.include_general {
            return None;
        }
        match &self.secondary {
            Some(store) => Some(store.as_ref()),
            None if scope.owner.is_some() => Some(self.primary.as_ref()),
            None => None,
        }
    }
}

fn query_store(
    store: &dyn VectorStore,
    role: &'static str,
    query: &[f32],
    owner: Option<&str>,
    limit: usize,
    threshold: f32,
) -> Vec<ScoredDocument> {
    match store.search(query, owner, limit, threshold) {
        Ok(docs) => docs,
        Err(err) => {
            warn!(store = store.name(), role, error = %err, "search_store_failed");
            Vec::new()
        }
    }
}

fn query_store_where(
    store: &dyn VectorStore,
    role: &'static str,
    query: &[f32],
    keep: &dyn Fn(&Document) -> bool,
    limit: usize,
    threshold: f32,
) -> Vec<ScoredDocument> {
    match store.search_where(query, keep, limit, threshold) {
        Ok(docs) => docs,
        Err(err) => {
            warn!(store = store.name(), role, error = %err, "search_store_failed");
            Vec::new()
        }
    }
}
