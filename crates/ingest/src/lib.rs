//! Ingest layer for the retrieval pipeline.
//!
//! Everything that turns files and message payloads into [`Document`]s lives
//! here. Nothing in this crate touches embeddings; the index builder fills the
//! `embedding` slot later.
//!
//! ## What we do here
//!
//! - **Normalize messages** - [`parse`], [`parse_single`] and [`parse_all`]
//!   accept a JSON object, a JSON array, `{"messages": [...]}`, concatenated
//!   objects or bracket-tagged text, and never fail.
//! - **Chunk plain text** - [`chunk_text`] cuts fixed windows with overlap.
//! - **Walk a corpus** - [`discover`] lists eligible files in a stable order and
//!   [`load_documents`] turns them into documents with owners and UUIDv5 ids.
//!
//! ## Example
//!
//! ```
//! use ingest::{parse, DEFAULT_MOOD};
//!
//! let docs = parse(r#"{"messages":[{"content":"a"},{"content":"b"}]}"#);
//! assert_eq!(docs.len(), 2);
//! assert_eq!(docs[0].mood.as_deref(), Some(DEFAULT_MOOD));
//!
//! let plain = parse("no structure at all");
//! assert_eq!(plain[0].content, "no structure at all");
//! ```

mod chunk;
mod config;
mod corpus;
mod error;
mod parser;
mod shape;
mod types;

pub use crate::chunk::{chunk_documents, chunk_text};
pub use crate::config::{ChunkingConfig, CorpusConfig};
pub use crate::corpus::{
    discover, document_id, load_documents, load_file, owner_from_path, CorpusFile, SourceKind,
};
pub use crate::error::IngestError;
pub use crate::parser::{
    convert_text_to_json, parse, parse_all, parse_single, parse_with_strategy,
    record_to_document, validate_json_format, ParseStrategy,
};
pub use crate::shape::{detect_shape, JsonShape};
pub use crate::types::{Document, ExtractionMethod, DEFAULT_CONTEXT_TAG, DEFAULT_MOOD};
