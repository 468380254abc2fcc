//! Schema normalisation: loosely-typed article object → [`ArticleRecord`].
//!
//! This step never fails. Every field the model left out, set to `null`, or
//! returned with an unexpected type is covered by a default, so one sloppy
//! article can never cost the rest of the page.
//!
//! | Field | Expected | Fallback |
//! |-------|----------|----------|
//! | `title`, `involvement`, `past`, `present` | string | scalar → its text, array/object → compact JSON, missing/null → `""` |
//! | `points` | array of strings | bare string → one point, scalars → text, null items dropped, otherwise `[]` |
//! | `glossary` | object of strings | non-string definitions → compact JSON, otherwise `{}` |
//!
//! The model-supplied `articleId` is ignored; ids come from the table.

use crate::output::ArticleRecord;
use crate::pipeline::parse::RawArticle;
use serde_json::Value;
use std::collections::BTreeMap;

/// Build a record from one decoded article object.
pub fn normalize_article(raw: &RawArticle, article_id: u64) -> ArticleRecord {
    ArticleRecord {
        article_id,
        title: text_field(raw, "title"),
        involvement: text_field(raw, "involvement"),
        past: text_field(raw, "past"),
        present: text_field(raw, "present"),
        points: points_field(raw.get("points")),
        glossary: glossary_field(raw.get("glossary")),
    }
}

/// Normalise a page's articles, numbering them consecutively from `first_id`.
pub fn normalize_batch(raw: &[RawArticle], first_id: u64) -> Vec<ArticleRecord> {
    raw.iter()
        .zip(first_id..)
        .map(|(article, id)| normalize_article(article, id))
        .collect()
}

fn text_field(raw: &RawArticle, key: &str) -> String {
    raw.get(key).map(value_to_text).unwrap_or_default()
}

fn value_to_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn points_field(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::Array(items)) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(value_to_text)
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn glossary_field(v: Option<&Value>) -> BTreeMap<String, String> {
    match v {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(term, definition)| (term.clone(), value_to_text(definition)))
            .collect(),
        _ => BTreeMap::new(),
    }
}
