//! # edgequake-news2csv
//!
//! Turn archives of scanned newspaper pages into a growing CSV table of
//! articles, using a Vision Language Model to read each page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ZIP archive
//!  │
//!  ├─ 1. Archive    list .png/.jpg/.jpeg entries in sorted name order
//!  ├─ 2. Encode     bytes → base64 + MIME type
//!  ├─ 3. Inference  one generateContent call per page (Gemini)
//!  ├─ 4. Parse      strip code fences, recover the JSON array of articles
//!  ├─ 5. Normalize  default every missing field, assign articleId
//!  └─ 6. Store      append rows to uploads/<stem>_articles.csv
//! ```
//!
//! A page that fails (service error, unreadable answer) is logged and
//! skipped; the other pages of the archive are still processed. Article ids
//! continue across runs: each run starts at the table's row count + 1.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_news2csv::{process_archive_file, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .api_key(std::env::var("GEMINI_API_KEY")?)
//!         .uploads_dir("uploads")
//!         .build()?;
//!     let report = process_archive_file("monday.zip", &config).await?;
//!     eprintln!(
//!         "{} article(s) from {}/{} page(s) → {}",
//!         report.stats.articles_appended,
//!         report.stats.succeeded_images,
//!         report.stats.total_images,
//!         report.table_path.display()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `news2csv` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-news2csv = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{ImageError, InferenceError, MalformedKind, News2CsvError};
pub use extract::{fetch_table, process_archive, process_archive_file, process_archive_sync};
pub use output::{ArchiveReport, ArticleRecord, ExtractionStats, ImageOutcome, TABLE_COLUMNS};
pub use pipeline::encode::InlineImage;
pub use pipeline::llm::{GeminiClient, InferenceBackend};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
