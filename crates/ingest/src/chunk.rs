//! Fixed-window chunking for plain-text sources.

use crate::config::ChunkingConfig;
use crate::types::{Document, ExtractionMethod};

/// Split `text` into windows of `chunk_size` characters, each starting
/// `chunk_size - chunk_overlap` characters after the previous one.
///
/// Windows are measured in `char`s so multi-byte text is never split inside a
/// code point. Whitespace-only windows are dropped. The caller is expected to
/// have validated `cfg`; an overlap that is not smaller than the window is
/// clamped to a one-character step.
pub fn chunk_text(text: &str, cfg: &ChunkingConfig) -> Vec<String> {
    if text.trim().is_empty() || cfg.chunk_size == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= cfg.chunk_size {
        return vec![text.trim().to_string()];
    }

    let step = cfg.chunk_size.saturating_sub(cfg.chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + cfg.chunk_size).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        let window = window.trim();
        if !window.is_empty() {
            chunks.push(window.to_string());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Chunk `text` into documents attributed to `source`.
///
/// Chunk positions are recorded in `message_index`; ids are left empty for
/// the corpus loader to assign.
pub fn chunk_documents(text: &str, source: &str, cfg: &ChunkingConfig) -> Vec<Document> {
    chunk_text(text, cfg)
        .into_iter()
        .enumerate()
        .map(|(index, content)| Document {
            content,
            message_index: index,
            source: source.to_string(),
            extraction_method: ExtractionMethod::Standard,
            ..Default::default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: size,
            chunk_overlap: overlap,
        }
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("  hello  ", &cfg(10, 2)), vec!["hello"]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk_text("   \n", &cfg(10, 2)).is_empty());
    }

    #[test]
    fn windows_overlap() {
        let text = "abcdefghijklmnopqrst";
        let chunks = chunk_text(text, &cfg(8, 3));
        assert_eq!(chunks[0], "abcdefgh");
        assert_eq!(chunks[1], "fghijklm");
        assert!(chunks.last().unwrap().ends_with('t'));
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().rev().take(3).collect::<Vec<_>>().into_iter().rev().collect();
            assert!(pair[1].starts_with(&tail));
        }
    }

    #[test]
    fn boundary_span_is_contained_in_some_chunk() {
        let mut text = "x".repeat(95);
        text.push_str("NEEDLE");
        text.push_str(&"y".repeat(100));
        let chunks = chunk_text(&text, &cfg(100, 10));
        assert!(chunks.iter().any(|c| c.contains("NEEDLE")));
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "héllo wörld ünïcödé ".repeat(5);
        let chunks = chunk_text(&text, &cfg(7, 2));
        assert!(chunks.iter().all(|c| c.chars().count() <= 7));
    }

    #[test]
    fn chunk_documents_carry_source_and_position() {
        let docs = chunk_documents(&"word ".repeat(50), "notes.txt", &cfg(40, 5));
        assert!(docs.len() > 1);
        assert!(docs.iter().all(|d| d.source == "notes.txt"));
        assert_eq!(docs[1].message_index, 1);
    }
}
