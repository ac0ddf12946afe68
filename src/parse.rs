//! Result Parsing
//!
//! Turns a raw store value into a [`ParsedValue`]. When the store is known to
//! hold JSON the value is decoded; a value that fails to decode becomes a
//! fixed, displayable message instead of an error.

use serde::Serialize;

/// Message shown in place of a value that should have been JSON but was not
pub const INVALID_JSON_MESSAGE: &str =
    "The retrieved value was not properly formatted JSON. Please uncheck the option JSON";

/// A retrieved value, classified
///
/// Serializes untagged: a structured value as its JSON tree, the two string
/// variants as plain JSON strings. That is the shape the presentation layer
/// expects for `details`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParsedValue {
    /// Decoded JSON
    Structured(serde_json::Value),
    /// Raw value, untouched
    Plain(String),
    /// Decode failure, rendered as text
    ParseError(String),
}

impl ParsedValue {
    /// The value as text, when it is string-shaped
    ///
    /// `Plain`, `ParseError` and a structured JSON string all count.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Plain(s) | Self::ParseError(s) => Some(s),
            Self::Structured(serde_json::Value::String(s)) => Some(s),
            Self::Structured(_) => None,
        }
    }
}

/// Classify a raw store value
///
/// Store misses never get here; the caller reports them as "no data".
#[must_use]
pub fn parse(raw: &str, is_structured: bool) -> ParsedValue {
    if !is_structured {
        return ParsedValue::Plain(raw.to_string());
    }
    match serde_json::from_str(raw) {
        Ok(value) => ParsedValue::Structured(value),
        Err(e) => {
            tracing::debug!(error = %e, "Stored value is not valid JSON");
            ParsedValue::ParseError(INVALID_JSON_MESSAGE.to_string())
        }
    }
}
