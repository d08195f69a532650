use std::cmp::Ordering;
use std::sync::Arc;

use ingest::Document;
use serde::{Deserialize, Serialize};

use crate::IndexError;

/// A document matched by a similarity query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    /// Cosine similarity clamped to `[0, 1]`; higher is closer.
    pub similarity_score: f32,
    /// Cosine distance, `1 - cosine`.
    pub distance_score: f32,
}

/// Something that answers nearest-neighbour queries over documents.
///
/// Implementations return at most `limit` documents whose similarity is at
/// least `threshold`, highest first, with ties in insertion order. When
/// `owner` is set only that owner's documents are candidates. Documents
/// without an embedding are never returned.
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str {
        "vector-store"
    }

    fn search(
        &self,
        query: &[f32],
        owner: Option<&str>,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredDocument>, IndexError>;

    /// Like [`search`](Self::search) without an owner filter, keeping only
    /// documents `keep` accepts. `keep` runs before `limit` is applied, so a
    /// selective filter still fills the result.
    fn search_where(
        &self,
        query: &[f32],
        keep: &dyn Fn(&Document) -> bool,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredDocument>, IndexError> {
        let mut hits = self.search(query, None, usize::MAX, threshold)?;
        hits.retain(|hit| keep(&hit.document));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Other documents from `source` whose `message_index` lies within
    /// `window` of `message_index`, in index order. Stores that cannot
    /// enumerate their documents return none.
    fn neighbours(
        &self,
        source: &str,
        message_index: usize,
        window: usize,
    ) -> Result<Vec<Document>, IndexError> {
        let _ = (source, message_index, window);
        Ok(Vec::new())
    }
}

impl<T: VectorStore + ?Sized> VectorStore for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn search(
        &self,
        query: &[f32],
        owner: Option<&str>,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredDocument>, IndexError> {
        (**self).search(query, owner, limit, threshold)
    }

    fn search_where(
        &self,
        query: &[f32],
        keep: &dyn Fn(&Document) -> bool,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredDocument>, IndexError> {
        (**self).search_where(query, keep, limit, threshold)
    }

    fn neighbours(
        &self,
        source: &str,
        message_index: usize,
        window: usize,
    ) -> Result<Vec<Document>, IndexError> {
        (**self).neighbours(source, message_index, window)
    }
}

/// Flat in-memory index scanned linearly on every query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    documents: Vec<Document>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            documents: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of documents, with or without an embedding.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Documents that can match a query.
    pub fn embedded_count(&self) -> usize {
        self.documents.iter().filter(|d| d.has_embedding()).count()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Append a document. An embedding, when present, must match the index
    /// dimension.
    pub fn insert(&mut self, document: Document) -> Result<(), IndexError> {
        if let Some(embedding) = document.embedding.as_ref().filter(|e| !e.is_empty()) {
            if embedding.len() != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimension,
                    got: embedding.len(),
                });
            }
        }
        self.documents.push(document);
        Ok(())
    }

    pub fn extend<I>(&mut self, documents: I) -> Result<(), IndexError>
    where
        I: IntoIterator<Item = Document>,
    {
        for doc in documents {
            self.insert(doc)?;
        }
        Ok(())
    }
}

impl VectorIndex {
    /// Linear scan shared by every query path. Similarity is inclusive:
    /// a document scoring exactly `threshold` matches.
    fn scan(
        &self,
        query: &[f32],
        keep: &dyn Fn(&Document) -> bool,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredDocument>, IndexError> {
        if limit == 0 || query.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }

        let mut hits: Vec<(usize, f32)> = Vec::new();
        for (pos, doc) in self.documents.iter().enumerate() {
            let Some(embedding) = doc.embedding.as_deref().filter(|e| !e.is_empty()) else {
                continue;
            };
            if !keep(doc) {
                continue;
            }
            let cosine = cosine_similarity(query, embedding);
            if cosine.clamp(0.0, 1.0) >= threshold {
                hits.push((pos, cosine));
            }
        }

        // `sort_by` is stable, so equal scores keep insertion order.
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        hits.truncate(limit);

        Ok(hits
            .into_iter()
            .map(|(pos, cosine)| ScoredDocument {
                document: self.documents[pos].clone(),
                similarity_score: cosine.clamp(0.0, 1.0),
                distance_score: 1.0 - cosine,
            })
            .collect())
    }
}

impl VectorStore for VectorIndex {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn search(
        &self,
        query: &[f32],
        owner: Option<&str>,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredDocument>, IndexError> {
        let keep = |doc: &Document| owner.map_or(true, |o| doc.owner.as_deref() == Some(o));
        self.scan(query, &keep, limit, threshold)
    }

    fn search_where(
        &self,
        query: &[f32],
        keep: &dyn Fn(&Document) -> bool,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredDocument>, IndexError> {
        self.scan(query, keep, limit, threshold)
    }

    fn neighbours(
        &self,
        source: &str,
        message_index: usize,
        window: usize,
    ) -> Result<Vec<Document>, IndexError> {
        let lo = message_index.saturating_sub(window);
        let hi = message_index.saturating_add(window);
        let mut found: Vec<&Document> = self
            .documents
            .iter()
            .filter(|d| d.source == source && d.message_index != message_index)
            .filter(|d| (lo..=hi).contains(&d.message_index))
            .collect();
        found.sort_by_key(|d| d.message_index);
        Ok(found.into_iter().cloned().collect())
    }
}

const CHUNK: usize = 32;

/// Cosine similarity, `0.0` when either side has zero norm or the lengths
/// differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    // Fixed-width chunks keep the inner loops easy to auto-vectorize.
    for (ca, cb) in a.chunks(CHUNK).zip(b.chunks(CHUNK)) {
        for (&x, &y) in ca.iter().zip(cb) {
            dot += x * y;
            norm_a += x * x;
            norm_b += y * y;
        }
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}
