//! Corpus discovery and loading.
//!
//! A corpus root holds per-owner knowledge files (`<owner>.json`), a messages
//! directory with `<owner>_messages.json` files, and any number of plain-text
//! files. Files are visited in file-name order so every run over the same tree
//! produces the same documents with the same ids.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn, Level};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunk::chunk_documents;
use crate::config::CorpusConfig;
use crate::parser::parse_all;
use crate::types::Document;
use crate::IngestError;

/// How a corpus file is turned into documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Json,
    Text,
}

/// An eligible file under a corpus root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusFile {
    pub path: PathBuf,
    /// Path relative to the corpus root with `/` separators; used as the
    /// document `source`.
    pub relative: String,
    pub owner: Option<String>,
    pub kind: SourceKind,
}

/// List eligible files under `root`, sorted by relative path.
///
/// A missing root is an empty corpus, not an error.
pub fn discover(root: &Path, cfg: &CorpusConfig) -> Result<Vec<CorpusFile>, IngestError> {
    if !root.exists() {
        debug!(root = %root.display(), "corpus_root_missing");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !cfg.accepts_extension(ext) {
            continue;
        }
        let relative = relative_path(root, path);
        let kind = if ext.eq_ignore_ascii_case("json") {
            SourceKind::Json
        } else {
            SourceKind::Text
        };
        files.push(CorpusFile {
            path: path.to_path_buf(),
            owner: owner_from_path(&relative, cfg),
            relative,
            kind,
        });
    }
    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// Owner encoded in a corpus-relative path.
///
/// `<owner>.json` at the root and `<messages_dir>/<owner><suffix>.json` map to
/// `owner`; everything else is unowned.
pub fn owner_from_path(relative: &str, cfg: &CorpusConfig) -> Option<String> {
    let path = Path::new(relative);
    let ext = path.extension()?.to_str()?;
    if !ext.eq_ignore_ascii_case("json") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let parents: Vec<&str> = path
        .parent()
        .map(|p| p.iter().filter_map(|c| c.to_str()).collect())
        .unwrap_or_default();

    let owner = match parents.as_slice() {
        [] => stem,
        [dir] if *dir == cfg.messages_dir => stem.strip_suffix(cfg.messages_suffix.as_str())?,
        _ => return None,
    };
    (!owner.is_empty()).then(|| owner.to_string())
}

/// Turn one corpus file into documents with stable ids.
///
/// JSON files go through [`parse_all`]. When none of the recovered messages
/// has a body (e.g. a knowledge file that is not a message list), the raw text
/// is chunked instead so the file still contributes to retrieval.
pub fn load_file(file: &CorpusFile, cfg: &CorpusConfig) -> Result<Vec<Document>, IngestError> {
    let bytes = std::fs::read(&file.path)?;
    let text =
        String::from_utf8(bytes).map_err(|_| IngestError::InvalidUtf8(file.relative.clone()))?;

    let mut docs = match file.kind {
        SourceKind::Json => {
            let parsed = parse_all(&text);
            if parsed.iter().any(|d| !d.content.trim().is_empty()) {
                parsed
                    .into_iter()
                    .filter(|d| !d.content.trim().is_empty())
                    .collect()
            } else {
                chunk_documents(&text, &file.relative, &cfg.chunking)
            }
        }
        SourceKind::Text => chunk_documents(&text, &file.relative, &cfg.chunking),
    };

    for doc in &mut docs {
        doc.source = file.relative.clone();
        doc.owner = file.owner.clone();
        doc.id = document_id(
            &cfg.doc_id_namespace,
            &file.relative,
            doc.message_index,
            doc.message_id.as_deref(),
        );
    }
    Ok(docs)
}

/// Load every document under `root`.
///
/// Unreadable or non-UTF-8 files are skipped with a warning; only a failed
/// directory walk aborts the load.
pub fn load_documents(root: &Path, cfg: &CorpusConfig) -> Result<Vec<Document>, IngestError> {
    let start = Instant::now();
    let span = tracing::span!(Level::INFO, "ingest.load_documents", root = %root.display());
    let _guard = span.enter();

    cfg.validate()?;
    let files = discover(root, cfg)?;
    let mut documents = Vec::new();
    let mut skipped = 0usize;
    for file in &files {
        match load_file(file, cfg) {
            Ok(docs) => documents.extend(docs),
            Err(err) => {
                skipped += 1;
                warn!(file = %file.relative, error = %err, "load_file_skipped");
            }
        }
    }

    info!(
        files = files.len(),
        skipped,
        documents = documents.len(),
        elapsed_micros = start.elapsed().as_micros(),
        "load_documents_success"
    );
    Ok(documents)
}

/// Deterministic UUIDv5 id for a document at `index` within `source`.
pub fn document_id(
    namespace: &Uuid,
    source: &str,
    index: usize,
    message_id: Option<&str>,
) -> String {
    let material = format!("{source}\u{1f}{index}\u{1f}{}", message_id.unwrap_or(""));
    Uuid::new_v5(namespace, material.as_bytes()).to_string()
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.iter()
        .map(|c| c.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
