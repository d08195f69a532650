//! Permissive message parsing.
//!
//! Strategies are tried in a fixed order and the first one that yields a
//! result wins:
//!
//! 1. the whole input as JSON (object, array or `{"messages": [...]}`),
//! 2. balanced `{...}` spans pulled out with a regex, each decoded on its own,
//! 3. the bracketed tag format `[CHARACTER: .. | TYPE: .. | MOOD: .. | CONTEXT: ..]`,
//! 4. the raw input as a single plain-text document.
//!
//! None of the entry points return an error. Malformed spans are dropped with a
//! `debug!` event.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::shape::{detect_shape, JsonShape};
use crate::types::{Document, ExtractionMethod, DEFAULT_CONTEXT_TAG, DEFAULT_MOOD};

// One level of nested braces is enough for message records.
static SPAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").expect("valid regex"));

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[CHARACTER: ([^|]+) \| TYPE: ([^|]+) \| MOOD: ([^|]+) \| CONTEXT: ([^\]]+)\]\s*([^\[]*)",
    )
    .expect("valid regex")
});

/// Which strategy produced a parse result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    WholeJson,
    Spans,
    TaggedText,
    PlainText,
}

impl ParseStrategy {
    fn as_str(self) -> &'static str {
        match self {
            ParseStrategy::WholeJson => "whole_json",
            ParseStrategy::Spans => "spans",
            ParseStrategy::TaggedText => "tagged_text",
            ParseStrategy::PlainText => "plain_text",
        }
    }
}

/// Parse `raw` into documents using plain field extraction.
///
/// JSON payloads yield every message they carry. The tagged-text fallback
/// yields only the first tagged message.
pub fn parse(raw: &str) -> Vec<Document> {
    parse_with_strategy(raw, ExtractionMethod::Standard).1
}

/// Parse `raw` and keep only the first document.
pub fn parse_single(raw: &str) -> Document {
    parse(raw)
        .into_iter()
        .next()
        .unwrap_or_else(|| Document::from_content(raw))
}

/// Recover every message in `raw`, marking documents for extended indexing.
///
/// Unlike [`parse`], the tagged-text fallback returns one document per tag.
pub fn parse_all(raw: &str) -> Vec<Document> {
    parse_with_strategy(raw, ExtractionMethod::Extended).1
}

/// Run the strategy chain and report which strategy succeeded.
pub fn parse_with_strategy(raw: &str, method: ExtractionMethod) -> (ParseStrategy, Vec<Document>) {
    let (strategy, docs) = if let Some(docs) = parse_whole(raw, method) {
        (ParseStrategy::WholeJson, docs)
    } else if let Some(docs) = parse_spans(raw, method) {
        (ParseStrategy::Spans, docs)
    } else if let Some(docs) = parse_tagged(raw, method) {
        (ParseStrategy::TaggedText, docs)
    } else {
        let mut doc = Document::from_content(raw);
        doc.extraction_method = method;
        (ParseStrategy::PlainText, vec![doc])
    };

    debug!(
        strategy = strategy.as_str(),
        documents = docs.len(),
        "parse_complete"
    );
    (strategy, docs)
}

/// Convert bracket-tagged text into a `{"messages": [...]}` JSON document.
///
/// Ids are numbered from `msg_001`. Text without any tag becomes a single
/// message holding the trimmed input.
pub fn convert_text_to_json(text: &str) -> String {
    let mut messages: Vec<Value> = TAG_RE
        .captures_iter(text)
        .enumerate()
        .map(|(i, caps)| {
            json!({
                "id": format!("msg_{:03}", i + 1),
                "character": caps[1].trim(),
                "character_type": caps[2].trim(),
                "mood": caps[3].trim(),
                "context": caps[4].trim(),
                "content": caps[5].trim(),
            })
        })
        .collect();

    if messages.is_empty() && !text.trim().is_empty() {
        messages.push(json!({
            "id": "msg_001",
            "content": text.trim(),
        }));
    }

    json!({ "messages": messages }).to_string()
}

/// True when `text` is valid JSON or contains at least one decodable object span.
pub fn validate_json_format(text: &str) -> bool {
    if serde_json::from_str::<Value>(text.trim()).is_ok() {
        return true;
    }
    SPAN_RE
        .find_iter(text)
        .any(|m| serde_json::from_str::<Value>(m.as_str()).is_ok())
}

fn parse_whole(raw: &str, method: ExtractionMethod) -> Option<Vec<Document>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    let shape = detect_shape(value)?;
    debug!(shape = shape.kind(), "parse_whole_json");
    Some(records_to_documents(shape.into_records(), method))
}

fn parse_spans(raw: &str, method: ExtractionMethod) -> Option<Vec<Document>> {
    let mut records = Vec::new();
    for span in SPAN_RE.find_iter(raw) {
        match serde_json::from_str::<Value>(span.as_str()) {
            Ok(value) => {
                if let Some(shape) = detect_shape(value) {
                    records.extend(shape.into_records());
                }
            }
            Err(err) => {
                debug!(offset = span.start(), error = %err, "parse_span_skipped");
            }
        }
    }
    if records.is_empty() {
        None
    } else {
        Some(records_to_documents(records, method))
    }
}

fn parse_tagged(raw: &str, method: ExtractionMethod) -> Option<Vec<Document>> {
    let limit = match method {
        ExtractionMethod::Standard => 1,
        ExtractionMethod::Extended => usize::MAX,
    };
    let docs: Vec<Document> = TAG_RE
        .captures_iter(raw)
        .take(limit)
        .enumerate()
        .map(|(index, caps)| Document {
            id: default_message_id(index),
            content: caps[5].trim().to_string(),
            speaker: Some(caps[1].trim().to_string()),
            speaker_type: Some(caps[2].trim().to_string()),
            mood: Some(caps[3].trim().to_string()),
            context_tag: Some(caps[4].trim().to_string()),
            message_id: Some(default_message_id(index)),
            message_index: index,
            extraction_method: method,
            ..Default::default()
        })
        .collect();
    if docs.is_empty() {
        None
    } else {
        Some(docs)
    }
}

fn records_to_documents(records: Vec<Map<String, Value>>, method: ExtractionMethod) -> Vec<Document> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| record_to_document(record, i, method))
        .collect()
}

/// Map one JSON message record onto a [`Document`].
///
/// Missing optional keys fall back to neutral defaults; nothing here fails.
pub fn record_to_document(
    record: &Map<String, Value>,
    index: usize,
    method: ExtractionMethod,
) -> Document {
    let message_id = field(record, &["id"]).unwrap_or_else(|| default_message_id(index));
    Document {
        id: message_id.clone(),
        content: field(record, &["content", "message"]).unwrap_or_default(),
        speaker: field(record, &["character", "speaker"]),
        speaker_type: field(record, &["character_type", "type"]),
        mood: Some(field(record, &["mood"]).unwrap_or_else(|| DEFAULT_MOOD.to_string())),
        context_tag: Some(
            field(record, &["context"]).unwrap_or_else(|| DEFAULT_CONTEXT_TAG.to_string()),
        ),
        thread_id: field(record, &["thread_id"]),
        reply_to: field(record, &["reply_to"]),
        timestamp: field(record, &["timestamp"]),
        message_id: Some(message_id),
        message_index: index,
        extraction_method: method,
        ..Default::default()
    }
}

fn default_message_id(index: usize) -> String {
    format!("msg_{index:03}")
}

/// First key present with a scalar value. Numbers and booleans are stringified.
fn field(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match record.get(*key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_messages_yield_each_message_with_defaults() {
        let docs = parse(r#"{"messages":[{"content":"a"},{"content":"b"}]}"#);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "a");
        assert_eq!(docs[1].content, "b");
        assert!(docs.iter().all(|d| d.mood.as_deref() == Some("neutral")));
        assert!(docs
            .iter()
            .all(|d| d.context_tag.as_deref() == Some("general")));
    }

    #[test]
    fn plain_text_becomes_single_document() {
        let raw = "just some notes about ownership and borrowing";
        let docs = parse(raw);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, raw);
        assert!(docs[0].mood.is_none());
        assert!(docs[0].speaker.is_none());
    }

    #[test]
    fn malformed_span_is_dropped() {
        let raw = r#"prefix {"content": "kept", "mood": "happy"} middle {content: broken} tail"#;
        let (strategy, docs) = parse_with_strategy(raw, ExtractionMethod::Standard);
        assert_eq!(strategy, ParseStrategy::Spans);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "kept");
        assert_eq!(docs[0].mood.as_deref(), Some("happy"));
    }

    #[test]
    fn array_and_single_object_payloads() {
        let docs = parse(r#"[{"message":"one","speaker":"ada"},{"content":"two"}, 7]"#);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "one");
        assert_eq!(docs[0].speaker.as_deref(), Some("ada"));

        let single = parse_single(r#"{"content":"solo","character":"bo","type":"bot"}"#);
        assert_eq!(single.content, "solo");
        assert_eq!(single.speaker_type.as_deref(), Some("bot"));
    }

    #[test]
    fn field_aliases_and_precedence() {
        let doc = parse_single(
            r#"{"content":"c","message":"m","character":"x","speaker":"y","character_type":"t1","type":"t2"}"#,
        );
        assert_eq!(doc.content, "c");
        assert_eq!(doc.speaker.as_deref(), Some("x"));
        assert_eq!(doc.speaker_type.as_deref(), Some("t1"));
    }

    #[test]
    fn missing_content_defaults_to_empty() {
        let doc = parse_single(r#"{"mood":"tired","thread_id":7}"#);
        assert_eq!(doc.content, "");
        assert_eq!(doc.thread_id.as_deref(), Some("7"));
        assert!(doc.reply_to.is_none());
    }

    #[test]
    fn message_ids_are_synthesised() {
        let docs = parse(r#"[{"content":"a","id":"custom"},{"content":"b"}]"#);
        assert_eq!(docs[0].message_id.as_deref(), Some("custom"));
        assert_eq!(docs[1].message_id.as_deref(), Some("msg_001"));
        assert_eq!(docs[1].message_index, 1);
    }

    #[test]
    fn tagged_text_single_versus_all() {
        let raw = "[CHARACTER: Ada | TYPE: human | MOOD: curious | CONTEXT: rust] What is a lifetime?\n\
                   [CHARACTER: Bo | TYPE: bot | MOOD: calm | CONTEXT: general] A scope for borrows.";
        let first = parse(raw);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].speaker.as_deref(), Some("Ada"));
        assert_eq!(first[0].content, "What is a lifetime?");

        let all = parse_all(raw);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].mood.as_deref(), Some("calm"));
        assert!(all
            .iter()
            .all(|d| d.extraction_method == ExtractionMethod::Extended));
    }

    #[test]
    fn parse_all_marks_json_documents_extended() {
        let docs = parse_all(r#"{"messages":[{"content":"a","context":"work"}]}"#);
        assert_eq!(docs[0].extraction_method, ExtractionMethod::Extended);
        assert_eq!(docs[0].index_text(), "a\n[Context: work]");
    }

    #[test]
    fn convert_text_to_json_numbers_from_one() {
        let out = convert_text_to_json(
            "[CHARACTER: Ada | TYPE: human | MOOD: happy | CONTEXT: chat] hi there",
        );
        let value: Value = serde_json::from_str(&out).unwrap();
        let msgs = value["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["id"], "msg_001");
        assert_eq!(msgs[0]["character"], "Ada");
        assert_eq!(msgs[0]["content"], "hi there");

        let roundtrip = parse(&out);
        assert_eq!(roundtrip[0].speaker.as_deref(), Some("Ada"));
    }

    #[test]
    fn convert_untagged_text_wraps_input() {
        let value: Value = serde_json::from_str(&convert_text_to_json("  loose text ")).unwrap();
        assert_eq!(value["messages"][0]["content"], "loose text");
        let empty: Value = serde_json::from_str(&convert_text_to_json("")).unwrap();
        assert!(empty["messages"].as_array().unwrap().is_empty());
    }

    #[test]
    fn validate_json_format_accepts_spans() {
        assert!(validate_json_format(r#"{"a":1}"#));
        assert!(validate_json_format(r#"noise {"a":1} noise"#));
        assert!(!validate_json_format("no braces here"));
        assert!(!validate_json_format("{not json}"));
    }

    #[test]
    fn scalar_json_falls_back_to_plain_text() {
        let docs = parse("42");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "42");
    }
}
