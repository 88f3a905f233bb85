//! Best-effort reconstruction of a section object from its partial JSON text.
//!
//! The server streams each section as fragments of one JSON object without
//! marking where the object ends. Rather than running a streaming parser, the
//! accumulated text is parsed whole whenever it could plausibly be complete,
//! i.e. when it ends in a closing brace. A failed attempt just means "not yet".

use serde_json::{Map, Value};

/// Fields recovered from a successfully parsed section buffer. A field is
/// `None` when the object did not carry it (or carried `null`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSection {
    pub content: Option<String>,
    pub example: Option<String>,
    pub knowledge_check: Option<Value>,
}

/// Whether `buffer` is worth a parse attempt: its trimmed text ends in `}`.
///
/// A buffer whose final fragment ends in anything else (e.g. trailing
/// punctuation after the object) never triggers a parse.
pub fn should_attempt_parse(buffer: &str) -> bool {
    buffer.trim_end().ends_with('}')
}

/// Parses the whole buffer as one JSON object. Returns `None` for incomplete or
/// invalid JSON and for any top-level value that is not an object.
pub fn try_parse_section(buffer: &str) -> Option<ParsedSection> {
    let object: Map<String, Value> = match serde_json::from_str(buffer) {
        Ok(Value::Object(object)) => object,
        _ => return None,
    };

    Some(ParsedSection {
        content: string_field(&object, "content"),
        example: string_field(&object, "example"),
        knowledge_check: object
            .get("knowledgeCheck")
            .filter(|value| !value.is_null())
            .cloned(),
    })
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}
