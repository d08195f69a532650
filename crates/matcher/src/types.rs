use index::{Document, ScoredDocument};
use semantic::EmbeddingTier;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which documents a query may draw from.
///
/// With an `owner` the primary query only sees that owner's documents; the
/// general store can then backfill sparse results when `include_general` is
/// set. `speaker` and `mood` narrow both queries to matching documents,
/// compared case-insensitively; a document without the field never matches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchScope {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default = "SearchScope::default_include_general")]
    pub include_general: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
}

impl SearchScope {
    fn default_include_general() -> bool {
        true
    }

    /// Unscoped search over everything.
    pub fn general() -> Self {
        Self {
            owner: None,
            include_general: true,
            speaker: None,
            mood: None,
        }
    }

    /// Search one owner's documents, backfilling from the general store.
    pub fn owner(owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            ..Self::general()
        }
    }

    /// Search one owner's documents only.
    pub fn owner_only(owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            include_general: false,
            ..Self::general()
        }
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    pub fn with_mood(mut self, mood: impl Into<String>) -> Self {
        self.mood = Some(mood.into());
        self
    }

    /// Whether a speaker or mood filter is set.
    pub fn filters_attributes(&self) -> bool {
        self.speaker.is_some() || self.mood.is_some()
    }

    /// Whether `doc` passes the speaker and mood filters. Owner is not
    /// checked here.
    pub fn admits(&self, doc: &Document) -> bool {
        field_matches(self.speaker.as_deref(), doc.speaker.as_deref())
            && field_matches(self.mood.as_deref(), doc.mood.as_deref())
    }
}

fn field_matches(wanted: Option<&str>, actual: Option<&str>) -> bool {
    match (wanted, actual) {
        (None, _) => true,
        (Some(wanted), Some(actual)) => wanted.trim().to_lowercase() == actual.trim().to_lowercase(),
        (Some(_), None) => false,
    }
}

impl Default for SearchScope {
    fn default() -> Self {
        Self::general()
    }
}

/// Tuning for [`SimilaritySearch`](crate::SimilaritySearch).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// Minimum similarity when the caller does not pass one.
    pub threshold: f32,
    /// The secondary store is queried with `threshold * relaxed_factor`.
    pub relaxed_factor: f32,
    /// The secondary store is consulted when the primary returns fewer than
    /// `limit * fallback_ratio` documents.
    pub fallback_ratio: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            relaxed_factor: 0.8,
            fallback_ratio: 0.5,
        }
    }
}

impl SearchConfig {
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_relaxed_factor(mut self, factor: f32) -> Self {
        self.relaxed_factor = factor;
        self
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(MatchError::InvalidConfig(
                "threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if !(self.relaxed_factor > 0.0 && self.relaxed_factor <= 1.0) {
            return Err(MatchError::InvalidConfig(
                "relaxed_factor must be in (0.0, 1.0]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.fallback_ratio) {
            return Err(MatchError::InvalidConfig(
                "fallback_ratio must be between 0.0 and 1.0".into(),
            ));
        }
        Ok(())
    }
}

/// Tuning for [`ContextAssembler`](crate::ContextAssembler).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Hard cap on the documents in a context set, whatever the caller asks.
    pub max_context_documents: usize,
    /// Drop documents whose content repeats a higher-ranked one.
    pub dedup_by_content: bool,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_context_documents: 20,
            dedup_by_content: true,
        }
    }
}

impl AssemblerConfig {
    pub fn with_max_context_documents(mut self, max: usize) -> Self {
        self.max_context_documents = max;
        self
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.max_context_documents == 0 {
            return Err(MatchError::InvalidConfig(
                "max_context_documents must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Result of [`SimilaritySearch::search_detailed`](crate::SimilaritySearch::search_detailed).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
    pub documents: Vec<ScoredDocument>,
    /// Primary hits before the merge.
    pub primary_hits: usize,
    /// Whether the secondary store was consulted.
    pub used_fallback: bool,
}

/// Ranked retrieval result handed to prompt construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextSet {
    /// Highest similarity first.
    pub documents: Vec<ScoredDocument>,
    /// In `[0, 1]`; exactly `0.0` when `documents` is empty.
    pub confidence_score: f32,
    /// Embedding tier that served the query, if it was embedded.
    pub query_tier: Option<EmbeddingTier>,
    pub used_fallback: bool,
}

impl ContextSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Label for [`confidence_score`](Self::confidence_score).
    pub fn quality_level(&self) -> &'static str {
        crate::assembler::quality_level(self.confidence_score)
    }
}

/// A retrieved document with the chunks around it in its source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextualDocument {
    #[serde(flatten)]
    pub scored: ScoredDocument,
    /// Same-source documents near the match, in source order.
    pub neighbours: Vec<Document>,
}

impl ContextualDocument {
    pub fn has_context(&self) -> bool {
        !self.neighbours.is_empty()
    }
}

/// [`ContextSet`] whose documents carry their neighbouring chunks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextualSet {
    pub documents: Vec<ContextualDocument>,
    pub confidence_score: f32,
    pub query_tier: Option<EmbeddingTier>,
    pub used_fallback: bool,
}

/// Result of adaptive retrieval: the context plus the cut-off it chose.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AdaptiveContext {
    pub context: ContextSet,
    /// Similarity threshold derived from the over-fetched candidates.
    pub threshold: f32,
    /// Candidates scored before the cut-off.
    pub candidates: usize,
}

/// Errors produced by the matching layer.
///
/// Search and assembly never return these; they surface only from
/// constructors and explicit validation.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("invalid match config: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let search = SearchConfig::default();
        assert!(search.validate().is_ok());
        assert_eq!(search.threshold, 0.7);
        assert_eq!(search.relaxed_factor, 0.8);
        let assembler = AssemblerConfig::default();
        assert!(assembler.validate().is_ok());
        assert_eq!(assembler.max_context_documents, 20);
    }

    #[test]
    fn invalid_values_rejected() {
        let err = SearchConfig::default()
            .with_relaxed_factor(0.0)
            .validate()
            .expect_err("config should be invalid");
        match err {
            MatchError::InvalidConfig(msg) => assert!(msg.contains("relaxed_factor")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(SearchConfig::default().with_threshold(1.5).validate().is_err());
        assert!(AssemblerConfig::default()
            .with_max_context_documents(0)
            .validate()
            .is_err());
    }

    #[test]
    fn scope_serde_defaults() {
        let scope: SearchScope = serde_json::from_str(r#"{"owner":"alice"}"#).unwrap();
        assert_eq!(scope, SearchScope::owner("alice"));
        let scope: SearchScope = serde_json::from_str("{}").unwrap();
        assert_eq!(scope, SearchScope::general());
    }

    #[test]
    fn scope_attribute_filters() {
        let doc = Document {
            speaker: Some("Captain ".into()),
            mood: Some("Calm".into()),
            ..Default::default()
        };
        assert!(SearchScope::general().admits(&doc));
        assert!(!SearchScope::general().filters_attributes());
        assert!(SearchScope::general().with_speaker("captain").admits(&doc));
        assert!(SearchScope::general().with_mood("CALM").admits(&doc));
        assert!(!SearchScope::general().with_mood("angry").admits(&doc));
        assert!(!SearchScope::general()
            .with_speaker("captain")
            .admits(&Document::from_content("no speaker")));

        let scope: SearchScope =
            serde_json::from_str(r#"{"owner":"alice","mood":"calm"}"#).unwrap();
        assert_eq!(scope, SearchScope::owner("alice").with_mood("calm"));
        assert!(scope.filters_attributes());
    }

    #[test]
    fn empty_context_has_zero_confidence() {
        let ctx = ContextSet::empty();
        assert!(ctx.is_empty());
        assert_eq!(ctx.confidence_score, 0.0);
        assert_eq!(ctx.quality_level(), "poor");
    }
}
