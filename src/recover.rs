//! Two-stage parsing of LLM output that is supposed to be JSON.
//!
//! Even with `response_format` set, some endpoints still wrap the payload in
//! prose ("Here is the JSON you asked for: ..."). Stage one is a strict
//! parse; stage two extracts the first balanced `{...}` block and parses
//! that. Every outcome is tagged, so callers always know which stage
//! produced their object and a failure is never a silent empty map.

use serde_json::Map;

use crate::prelude::*;

/// A JSON object, as a key/value map.
pub type JsonObject = Map<String, Value>;

/// Outcome of leniently parsing a model response as a JSON object.
#[derive(Debug)]
pub enum LenientParse {
    /// The whole response was a JSON object.
    Strict(JsonObject),

    /// The response was prose, but a balanced `{...}` block inside it
    /// parsed as an object.
    Recovered(JsonObject),

    /// Neither stage produced an object.
    Malformed {
        /// What went wrong in the strict stage.
        strict_error: String,

        /// What went wrong in the recovery stage, when a candidate block
        /// was even found.
        recovery_error: Option<String>,
    },
}

impl LenientParse {
    /// The parsed object, if either stage succeeded.
    pub fn into_object(self) -> Option<JsonObject> {
        match self {
            LenientParse::Strict(object) | LenientParse::Recovered(object) => Some(object),
            LenientParse::Malformed { .. } => None,
        }
    }
}

/// Parse `raw` as a JSON object, recovering from surrounding prose.
pub fn parse_object(raw: &str) -> LenientParse {
    let strict_error = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(object)) => return LenientParse::Strict(object),
        Ok(other) => format!("expected a JSON object, got {}", value_kind(&other)),
        Err(err) => err.to_string(),
    };

    match first_balanced_object(raw) {
        Some(block) => match serde_json::from_str::<Value>(block) {
            Ok(Value::Object(object)) => LenientParse::Recovered(object),
            Ok(other) => LenientParse::Malformed {
                strict_error,
                recovery_error: Some(format!(
                    "recovered block parsed as {}, not an object",
                    value_kind(&other)
                )),
            },
            Err(err) => LenientParse::Malformed {
                strict_error,
                recovery_error: Some(err.to_string()),
            },
        },
        None => LenientParse::Malformed {
            strict_error,
            recovery_error: None,
        },
    }
}

/// Find the first balanced top-level `{...}` block, ignoring braces inside
/// JSON string literals.
fn first_balanced_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    // `}` is one byte, so this is a char boundary.
                    return Some(&raw[start..=start + idx]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Short human-readable name of a JSON value's kind, for error messages.
fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
