//! Shape detection for message payloads.
//!
//! Corpus files and uploads arrive in three JSON layouts. [`detect_shape`]
//! classifies a decoded value once so each layout gets its own decode path.

use serde_json::{Map, Value};

/// Top-level layout of a JSON message payload.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonShape {
    /// A single message object.
    SingleObject(Map<String, Value>),
    /// A bare array of message objects.
    Array(Vec<Value>),
    /// An object wrapping its messages as `{"messages": [...]}`.
    Wrapped(Vec<Value>),
}

impl JsonShape {
    /// Message records carried by this payload, in order. Non-object array
    /// items are skipped.
    pub fn into_records(self) -> Vec<Map<String, Value>> {
        match self {
            JsonShape::SingleObject(map) => vec![map],
            JsonShape::Array(items) | JsonShape::Wrapped(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JsonShape::SingleObject(_) => "single_object",
            JsonShape::Array(_) => "array",
            JsonShape::Wrapped(_) => "wrapped",
        }
    }
}

/// Classify a decoded JSON value. Scalars and `null` have no message shape.
///
/// An object is `Wrapped` only when its `messages` key holds an array; an
/// object with any other `messages` value is treated as a single message.
pub fn detect_shape(value: Value) -> Option<JsonShape> {
    match value {
        Value::Array(items) => Some(JsonShape::Array(items)),
        Value::Object(mut map) => match map.remove("messages") {
            Some(Value::Array(items)) => Some(JsonShape::Wrapped(items)),
            Some(other) => {
                map.insert("messages".into(), other);
                Some(JsonShape::SingleObject(map))
            }
            None => Some(JsonShape::SingleObject(map)),
        },
        _ => None,
    }
}
