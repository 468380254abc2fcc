//! Records and reports produced by the pipeline.

use crate::error::ImageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Column names of the accumulation table, in order.
pub const TABLE_COLUMNS: [&str; 7] = [
    "articleId",
    "title",
    "involvement",
    "past",
    "present",
    "points",
    "glossary",
];

/// One extracted news article.
///
/// `points` and `glossary` keep their structure in memory; they are only
/// flattened to text cells when the record is written to the table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub article_id: u64,
    pub title: String,
    pub involvement: String,
    pub past: String,
    pub present: String,
    /// Key points in reading order.
    pub points: Vec<String>,
    /// Term → definition.
    pub glossary: BTreeMap<String, String>,
}

impl ArticleRecord {
    /// The `points` cell: one point per line.
    pub fn points_cell(&self) -> String {
        self.points.join("\n")
    }

    /// The `glossary` cell: the mapping encoded as a JSON object.
    pub fn glossary_cell(&self) -> String {
        // A map of strings always serialises.
        serde_json::to_string(&self.glossary).unwrap_or_else(|_| "{}".to_string())
    }

    /// Inverse of [`ArticleRecord::points_cell`], except at two lossy edges:
    /// a point containing `\n` comes back split into several points, and a
    /// list of one empty point (`[""]`) comes back as `[]`.
    pub fn points_from_cell(cell: &str) -> Vec<String> {
        if cell.is_empty() {
            Vec::new()
        } else {
            cell.split('\n').map(str::to_string).collect()
        }
    }

    /// Inverse of [`ArticleRecord::glossary_cell`]. `None` if the cell is not a JSON object.
    ///
    /// Non-string definitions (written by other tools) come back as compact JSON text.
    pub fn glossary_from_cell(cell: &str) -> Option<BTreeMap<String, String>> {
        if cell.trim().is_empty() {
            return Some(BTreeMap::new());
        }
        match serde_json::from_str::<serde_json::Value>(cell).ok()? {
            serde_json::Value::Object(map) => Some(
                map.into_iter()
                    .map(|(term, def)| match def {
                        serde_json::Value::String(s) => (term, s),
                        other => (term, other.to_string()),
                    })
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// Result of processing a single archive entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageOutcome {
    /// Entry name inside the archive.
    pub name: String,
    /// Ids of the articles appended for this image (empty on failure).
    pub article_ids: Vec<u64>,
    /// Wall-clock time spent on the image, including the network call.
    pub duration_ms: u64,
    /// Why the image was skipped, if it was.
    pub error: Option<ImageError>,
}

impl ImageOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate counters for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_images: usize,
    pub succeeded_images: usize,
    pub failed_images: usize,
    pub articles_appended: usize,
    pub total_duration_ms: u64,
}

/// Batch report returned by [`crate::extract::process_archive`].
///
/// Per-image failures never abort a run; they are collected here so callers
/// and tests can inspect exactly which images were skipped and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveReport {
    /// Archive name as supplied by the caller.
    pub archive_name: String,
    /// Path of the accumulation table the run appended to.
    pub table_path: PathBuf,
    /// First id available when the run started (row count + 1).
    pub first_article_id: u64,
    /// One entry per qualifying image, in processing order.
    pub images: Vec<ImageOutcome>,
    pub stats: ExtractionStats,
}

impl ArchiveReport {
    /// Errors of every skipped image, in processing order.
    pub fn errors(&self) -> impl Iterator<Item = &ImageError> {
        self.images.iter().filter_map(|i| i.error.as_ref())
    }

    /// File name of the table, as accepted by [`crate::extract::fetch_table`].
    pub fn table_name(&self) -> Option<&str> {
        self.table_path.file_name().and_then(|n| n.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_round_trip_through_newline_cell() {
        let rec = ArticleRecord {
            points: vec!["a.".into(), "b.".into(), "c.".into()],
            ..Default::default()
        };
        let cell = rec.points_cell();
        assert_eq!(cell, "a.\nb.\nc.");
        let split: Vec<&str> = cell.split('\n').collect();
        assert_eq!(split, vec!["a.", "b.", "c."]);
        assert_eq!(ArticleRecord::points_from_cell(&cell), rec.points);
    }

    #[test]
    fn empty_points_cell_is_empty_vec() {
        assert!(ArticleRecord::points_from_cell("").is_empty());
    }

    #[test]
    fn points_cell_lossy_edges() {
        let multi = ArticleRecord {
            points: vec!["two\nlines".into()],
            ..Default::default()
        };
        assert_eq!(
            ArticleRecord::points_from_cell(&multi.points_cell()),
            vec!["two", "lines"]
        );
        let blank = ArticleRecord {
            points: vec![String::new()],
            ..Default::default()
        };
        assert!(ArticleRecord::points_from_cell(&blank.points_cell()).is_empty());
    }

    #[test]
    fn glossary_round_trips_through_json_cell() {
        let mut glossary = BTreeMap::new();
        glossary.insert("GDP".to_string(), "gross domestic product".to_string());
        let rec = ArticleRecord {
            glossary: glossary.clone(),
            ..Default::default()
        };
        let cell = rec.glossary_cell();
        assert_eq!(cell, r#"{"GDP":"gross domestic product"}"#);
        assert_eq!(ArticleRecord::glossary_from_cell(&cell), Some(glossary));
    }

    #[test]
    fn empty_glossary_cell_is_braces() {
        assert_eq!(ArticleRecord::default().glossary_cell(), "{}");
    }

    #[test]
    fn glossary_from_cell_rejects_non_object() {
        assert_eq!(ArticleRecord::glossary_from_cell("[1,2]"), None);
    }

    #[test]
    fn table_name_is_file_name() {
        let report = ArchiveReport {
            archive_name: "x.zip".into(),
            table_path: PathBuf::from("uploads/x_articles.csv"),
            first_article_id: 1,
            images: vec![],
            stats: ExtractionStats::default(),
        };
        assert_eq!(report.table_name(), Some("x_articles.csv"));
        assert_eq!(report.errors().count(), 0);
    }
}
