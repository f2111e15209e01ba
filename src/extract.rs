//! Recovers the JSON object a model embeds in its free-text reply.
//!
//! Two stages: find the fenced block (if any), then decode it. A reply that
//! does not decode to a JSON object is an error, never a partial object.

use serde_json::{Map, Value};
use thiserror::Error;

const FENCE: &str = "```";

/// How much of an unparseable body to keep in the error for diagnostics.
const SNIPPET_LEN: usize = 200;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("model reply contains no JSON object")]
    NoObject,
    #[error("model reply is not valid JSON: {source}: {snippet}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
        snippet: String,
    },
}

/// Extract the single JSON object from `raw`.
pub fn extract(raw: &str) -> Result<Map<String, Value>, ExtractError> {
    let body = fenced_block(raw).unwrap_or(raw).trim();
    if body.is_empty() {
        return Err(ExtractError::NoObject);
    }

    let value: Value = serde_json::from_str(body).map_err(|source| ExtractError::InvalidJson {
        source,
        snippet: body.chars().take(SNIPPET_LEN).collect(),
    })?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ExtractError::NoObject),
    }
}

/// Body of the first fenced block, with its language tag removed.
///
/// An opening fence without a closing one yields everything after it.
fn fenced_block(raw: &str) -> Option<&str> {
    let start = raw.find(FENCE)?;
    let inner = strip_language_tag(&raw[start + FENCE.len()..]);
    let end = inner.find(FENCE).unwrap_or(inner.len());
    Some(&inner[..end])
}

/// Drop a tag such as `json` or `JSON5` that directly follows the fence.
fn strip_language_tag(s: &str) -> &str {
    let tag_len = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(s.len());
    if tag_len == 0 {
        return s;
    }
    match s[tag_len..].chars().next() {
        None => &s[tag_len..],
        Some(c) if c.is_whitespace() || c == '{' => &s[tag_len..],
        Some(_) => s,
    }
}
