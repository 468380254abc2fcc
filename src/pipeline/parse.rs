//! Response parsing: turn the model's text into loosely-typed article objects.
//!
//! Even with an instruction that says "output only the JSON", multimodal
//! models regularly
//!
//! - wrap the array in ` ```json … ``` ` (or an untagged ` ``` … ``` `) fence,
//! - prepend a sentence such as "Here are the articles:",
//! - return a single object when the page holds a single article.
//!
//! Each quirk is handled by a small deterministic step below. Field presence
//! and types are *not* checked here; [`crate::pipeline::normalize`] defaults
//! every missing or odd field, so a syntactically valid response can never
//! crash the pipeline.
//!
//! ## Step Order
//!
//! Fences are stripped before decoding; the bracket-span recovery only runs
//! when the stripped text fails to decode.

use crate::error::MalformedKind;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// One article as decoded from the response, before normalisation.
pub type RawArticle = Map<String, Value>;

/// Why a response could not be turned into articles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub kind: MalformedKind,
    /// Bounded excerpt of the offending text.
    pub excerpt: String,
}

/// Parse raw response text into article objects.
///
/// Steps (applied in order):
/// 1. Trim and strip an outer code fence (with or without a language tag)
/// 2. Decode the remainder as JSON
/// 3. On failure, decode the span from the first `[` to the last `]`
/// 4. Accept an array (non-object elements are dropped) or a single object
pub fn parse_articles(raw: &str, excerpt_chars: usize) -> Result<Vec<RawArticle>, ParseFailure> {
    let text = strip_code_fences(raw);

    let value = match serde_json::from_str::<Value>(text) {
        Ok(v) => v,
        Err(first_err) => match recover_array_span(text) {
            Some(v) => {
                debug!("Recovered JSON array from surrounding text");
                v
            }
            None => {
                debug!("Response is not valid JSON: {}", first_err);
                return Err(ParseFailure {
                    kind: MalformedKind::Parse,
                    excerpt: excerpt(text, excerpt_chars),
                });
            }
        },
    };

    match value {
        Value::Array(items) => {
            let total = items.len();
            let articles: Vec<RawArticle> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect();
            if articles.len() < total {
                warn!(
                    "Dropped {} non-object element(s) from response array",
                    total - articles.len()
                );
            }
            Ok(articles)
        }
        Value::Object(map) => Ok(vec![map]),
        _ => Err(ParseFailure {
            kind: MalformedKind::NotAnArray,
            excerpt: excerpt(text, excerpt_chars),
        }),
    }
}

// ── Step 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\r?\n?```$").unwrap());

/// Remove a fence wrapping the whole text. Text without a complete outer
/// fence is returned trimmed but otherwise unchanged.
pub fn strip_code_fences(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).trim(),
        None => trimmed,
    }
}

// ── Step 3: Recover the array span ───────────────────────────────────────────

fn recover_array_span(text: &str) -> Option<Value> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(v @ Value::Array(_)) => Some(v),
        _ => None,
    }
}

// ── Diagnostics ──────────────────────────────────────────────────────────────

/// First `max_chars` characters of `text`, with an ellipsis when truncated.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
