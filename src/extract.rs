//! Archive-level entry points: run the whole pipeline once and fetch tables.
//!
//! ```text
//! archive ──▶ encode ──▶ llm ──▶ parse ──▶ normalize ──▶ store::append
//!  (zip)     (base64)   (send)   (JSON)    (records)       (CSV)
//! ```
//!
//! Images are handled strictly one at a time: each one is sent, parsed,
//! normalised and appended before the next is read from the archive. A
//! failing image becomes an [`ImageOutcome`] with an error and the loop
//! carries on; only archive-level and table-level failures end the run.

use crate::config::ExtractionConfig;
use crate::error::News2CsvError;
use crate::output::{ArchiveReport, ExtractionStats, ImageOutcome};
use crate::pipeline::archive::ImageArchive;
use crate::pipeline::llm::{self, GeminiClient, InferenceBackend};
use crate::pipeline::{encode, normalize};
use crate::prompts::EXTRACTION_PROMPT;
use crate::store;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Suffix appended to the archive stem to name its table.
pub const TABLE_SUFFIX: &str = "_articles.csv";

/// Run the full pipeline over an in-memory archive.
///
/// This is the primary entry point for the library. Articles are appended to
/// `{uploads_dir}/{stem}_articles.csv`, where `stem` is `archive_name`
/// without its extension; the table is created on first use.
///
/// # Returns
/// `Ok(ArchiveReport)` whenever the run completed, even if some (or all)
/// images failed; inspect `report.images` / `report.stats.failed_images`.
///
/// # Errors
/// Returns `Err(News2CsvError)` only for fatal conditions:
/// - `archive_name` is not a plain file name
/// - the payload is not a valid zip archive (before any image is processed)
/// - no API key and no injected backend
/// - the table is unreadable (before any append) or an append hits an I/O error
pub async fn process_archive(
    archive_bytes: Vec<u8>,
    archive_name: &str,
    config: &ExtractionConfig,
) -> Result<ArchiveReport, News2CsvError> {
    validate_name(archive_name)?;
    let archive = ImageArchive::from_bytes(archive_bytes, archive_name)?;
    run(archive, archive_name, config).await
}

/// Run the full pipeline over an archive on disk.
///
/// The table is named after the archive's file name, exactly as for
/// [`process_archive`].
pub async fn process_archive_file(
    archive_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ArchiveReport, News2CsvError> {
    let path = archive_path.as_ref();
    let archive_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| News2CsvError::InvalidName {
            name: path.display().to_string(),
        })?
        .to_string();
    let archive = ImageArchive::open(path)?;
    run(archive, &archive_name, config).await
}

/// Synchronous wrapper around [`process_archive`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_archive_sync(
    archive_bytes: Vec<u8>,
    archive_name: &str,
    config: &ExtractionConfig,
) -> Result<ArchiveReport, News2CsvError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| News2CsvError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_archive(archive_bytes, archive_name, config))
}

/// Read an accumulated table by file name (e.g. `batch_articles.csv`).
///
/// # Errors
/// [`News2CsvError::NotFound`] if no such table exists in `uploads_dir`,
/// [`News2CsvError::InvalidName`] if `table_name` is not a plain file name.
pub async fn fetch_table(
    table_name: &str,
    config: &ExtractionConfig,
) -> Result<Vec<u8>, News2CsvError> {
    validate_name(table_name)?;
    let path = config.table_path(table_name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(News2CsvError::NotFound {
            name: table_name.to_string(),
        }),
        Err(e) => Err(News2CsvError::Internal(format!(
            "Failed to read table '{}': {}",
            path.display(),
            e
        ))),
    }
}

/// Table file name for an archive: `batch.zip` → `batch_articles.csv`.
pub fn table_file_name(archive_name: &str) -> String {
    let stem = Path::new(archive_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(archive_name);
    format!("{}{}", stem, TABLE_SUFFIX)
}

/// Reject names that could escape `uploads_dir`.
fn validate_name(name: &str) -> Result<(), News2CsvError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || Path::new(name).is_absolute();
    if bad {
        return Err(News2CsvError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn resolve_backend(config: &ExtractionConfig) -> Result<Arc<dyn InferenceBackend>, News2CsvError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }
    Ok(Arc::new(GeminiClient::from_config(config)?))
}

async fn run<R: Read + Seek>(
    mut archive: ImageArchive<R>,
    archive_name: &str,
    config: &ExtractionConfig,
) -> Result<ArchiveReport, News2CsvError> {
    let total_start = Instant::now();
    info!("Starting extraction: {}", archive_name);

    // ── Step 1: Backend ──────────────────────────────────────────────────
    let backend = resolve_backend(config)?;
    let instruction = config.instruction.as_deref().unwrap_or(EXTRACTION_PROMPT);

    // ── Step 2: Table ────────────────────────────────────────────────────
    let table_path: PathBuf = config.table_path(&table_file_name(archive_name));
    store::ensure_table(&table_path)?;
    let first_article_id = store::next_id(&table_path)?;
    let mut next_id = first_article_id;
    info!(
        "Table '{}' ready; next articleId is {}",
        table_path.display(),
        next_id
    );

    // ── Step 3: Images, one at a time ────────────────────────────────────
    let total = archive.len();
    info!("Archive has {} image(s)", total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_archive_start(total);
    }

    let mut images = Vec::with_capacity(total);
    for (i, entry) in archive.entries().enumerate() {
        let index = i + 1;
        let image_start = Instant::now();

        let result = match entry {
            Ok(entry) => {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_image_start(index, total, &entry.name);
                }
                let inline = encode::encode_entry(&entry);
                llm::process_image(
                    backend.as_ref(),
                    &entry.name,
                    &inline,
                    instruction,
                    config.excerpt_chars,
                )
                .await
                .map(|raw| (entry.name, raw))
            }
            Err(e) => Err(e),
        };

        let outcome = match result {
            Ok((name, raw)) => {
                let records = normalize::normalize_batch(&raw, next_id);
                // Table-level failure: fatal, committed rows stay intact.
                store::append(&table_path, &records)?;
                let article_ids: Vec<u64> = records.iter().map(|r| r.article_id).collect();
                next_id += records.len() as u64;

                debug!("{}: appended {} article(s)", name, records.len());
                if let Some(ref cb) = config.progress_callback {
                    cb.on_image_complete(index, total, &name, records.len());
                }
                ImageOutcome {
                    name,
                    article_ids,
                    duration_ms: image_start.elapsed().as_millis() as u64,
                    error: None,
                }
            }
            Err(err) => {
                warn!("Skipping image: {}", err);
                let name = err.image().to_string();
                if let Some(ref cb) = config.progress_callback {
                    cb.on_image_error(index, total, &name, &err.to_string());
                }
                ImageOutcome {
                    name,
                    article_ids: Vec::new(),
                    duration_ms: image_start.elapsed().as_millis() as u64,
                    error: Some(err),
                }
            }
        };
        images.push(outcome);
    }

    // ── Step 4: Report ───────────────────────────────────────────────────
    let succeeded = images.iter().filter(|o| o.is_success()).count();
    let articles = (next_id - first_article_id) as usize;
    let stats = ExtractionStats {
        total_images: total,
        succeeded_images: succeeded,
        failed_images: total - succeeded,
        articles_appended: articles,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Extraction complete: {}/{} images, {} article(s), {}ms total",
        succeeded, total, articles, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_archive_complete(total, succeeded, articles);
    }

    Ok(ArchiveReport {
        archive_name: archive_name.to_string(),
        table_path,
        first_article_id,
        images,
        stats,
    })
}
