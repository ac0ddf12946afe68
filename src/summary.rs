//! Summary Tags
//!
//! Summary tags are the short labels shown next to an entity before the full
//! details are opened.
//!
//! # Tag Specification
//! For structured values the user supplies a comma-separated list of paths,
//! each optionally prefixed by a label:
//!
//! ```text
//! asn, Org:org.name, First Port:ports[0]
//! ```
//!
//! - `path` resolves with dot notation; numeric segments and `[n]` index arrays
//! - `label:path` renders as `label: value`
//! - paths that do not resolve produce no tag
//!
//! String-shaped values ignore the specification and produce a single tag,
//! truncated to [`MAX_TAG_CHARS`] characters.

use serde_json::Value;

use crate::parse::ParsedValue;

/// Longest string tag emitted before truncation
pub const MAX_TAG_CHARS: usize = 20;

/// Appended to truncated tags
pub const ELLIPSIS: &str = "...";

/// Derive the summary tags of a parsed value
#[must_use]
pub fn summarize(parsed: &ParsedValue, tag_spec: &str) -> Vec<String> {
    let tags = match (parsed.as_text(), parsed) {
        (Some(text), _) => vec![truncate(text)],
        (None, ParsedValue::Structured(value)) => project_tags(value, tag_spec),
        (None, _) => Vec::new(),
    };
    tracing::debug!(?tags, "Summary tags");
    tags
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_TAG_CHARS) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
        None => text.to_string(),
    }
}

fn project_tags(value: &Value, tag_spec: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for token in tag_spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let mut parts = token.split(':');
        let first = parts.next().unwrap_or_default();
        let (label, path) = match parts.next() {
            Some(path) => (Some(first.trim()), path.trim()),
            None => (None, first),
        };

        let Some(found) = lookup_path(value, path) else {
            tracing::trace!(path, "Summary path not found");
            continue;
        };
        let rendered = display(found);
        tags.push(match label {
            Some(label) => format!("{label}: {rendered}"),
            None => rendered,
        });
    }
    tags
}

/// Resolve a dot/bracket path against a JSON value
///
/// A key that literally equals the whole path (e.g. `"a.b"`) wins over
/// nested traversal. Empty segments (`""`, `"a."`, `"a..b"`) never match, so
/// such paths are not found rather than resolving to the root.
#[must_use]
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(direct) = value.as_object().and_then(|map| map.get(path)) {
        return Some(direct);
    }
    let segments = path_segments(path);
    if segments.is_empty() {
        return None;
    }
    segments.into_iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// `a.b[0].c` -> `["a", "b", "0", "c"]`, `a.` -> `["a", ""]`
fn path_segments(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let mut pieces = part.split('[');
        let head = pieces.next().unwrap_or_default();
        // `[0]` directly after a dot has no name before the bracket.
        if !head.is_empty() || !part.contains('[') {
            segments.push(head);
        }
        for index in pieces {
            segments.push(index.split(']').next().unwrap_or_default());
        }
    }
    segments
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
