//! Canonical document shape shared by corpus ingestion and query-time filtering.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default mood applied when a message record omits one.
pub const DEFAULT_MOOD: &str = "neutral";
/// Default context tag applied when a message record omits one.
pub const DEFAULT_CONTEXT_TAG: &str = "general";

/// How a [`Document`] was produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Plain field extraction; the document is indexed by its raw content.
    #[default]
    Standard,
    /// Field extraction plus contextual annotations appended at index time.
    Extended,
}

/// A single retrievable unit of text.
///
/// Documents come out of [`parse`](crate::parse) / [`parse_all`](crate::parse_all)
/// for JSON message sources and out of [`chunk_text`](crate::chunk_text) for
/// plain-text sources. The `embedding` slot is filled later by the index
/// builder; everything else is immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Document {
    /// Stable identifier, unique within a corpus.
    pub id: String,
    /// Message body (or chunk text). Empty when the record had no body.
    pub content: String,
    /// Who wrote the message (`character` / `speaker`).
    pub speaker: Option<String>,
    /// Speaker category (`character_type` / `type`).
    pub speaker_type: Option<String>,
    pub mood: Option<String>,
    pub context_tag: Option<String>,
    pub thread_id: Option<String>,
    pub reply_to: Option<String>,
    pub timestamp: Option<String>,
    /// Identifier carried by the record itself, or a synthesised `msg_NNN`.
    pub message_id: Option<String>,
    /// Position of the message inside its source payload.
    pub message_index: usize,
    /// Corpus owner this document belongs to, derived from the file layout.
    pub owner: Option<String>,
    /// Where the document came from (file path or caller-supplied label).
    pub source: String,
    pub extraction_method: ExtractionMethod,
    /// Vector representation, populated by the index builder.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl Document {
    /// Document carrying only a body, as produced by the plain-text fallback.
    pub fn from_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Content with human-readable annotations for context tag, reply target
    /// and thread id appended on a trailing bracketed line.
    ///
    /// Annotations equal to their neutral defaults are omitted, so a message
    /// without contextual metadata yields its content unchanged.
    pub fn extended_content(&self) -> String {
        let mut parts = Vec::new();
        if let Some(context) = self
            .context_tag
            .as_deref()
            .filter(|c| !c.is_empty() && *c != DEFAULT_CONTEXT_TAG)
        {
            parts.push(format!("Context: {context}"));
        }
        if let Some(reply_to) = self.reply_to.as_deref().filter(|r| !r.is_empty()) {
            parts.push(format!("Reply to: {reply_to}"));
        }
        if let Some(thread) = self.thread_id.as_deref().filter(|t| !t.is_empty()) {
            parts.push(format!("Thread: {thread}"));
        }

        if parts.is_empty() {
            self.content.clone()
        } else {
            format!("{}\n[{}]", self.content, parts.join(" | "))
        }
    }

    /// Text that should be embedded for this document.
    pub fn index_text(&self) -> String {
        match self.extraction_method {
            ExtractionMethod::Standard => self.content.clone(),
            ExtractionMethod::Extended => self.extended_content(),
        }
    }

    /// Hex SHA-256 over the content, used to deduplicate retrieval results.
    pub fn content_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|v| !v.is_empty())
    }
}
