//! Accumulation store: the append-only CSV table that outlives every run.
//!
//! ## Invariants
//!
//! - The header row is written exactly once, when the table is created.
//! - Rows are only ever appended; nothing here rewrites or deletes a
//!   committed row.
//! - At the start of a run, `next_id == data rows + 1`. Ids therefore continue
//!   across restarts without any state besides the table itself. This assumes
//!   a single writer per table path; concurrent runs against the same table
//!   would race on the row count.
//! - Every committed row ends with `\n`.
//!
//! ## Crash safety
//!
//! A batch is serialised in memory and written with one `write_all`, then
//! synced. If the write fails the file is truncated back to its previous
//! length. If the process dies mid-write, the next [`ensure_table`] finds the
//! unterminated or malformed trailing record and truncates it, so the
//! committed rows are never damaged and the half-written batch is dropped.

use crate::error::News2CsvError;
use crate::output::{ArticleRecord, TABLE_COLUMNS};
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// What the end of an existing table looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    /// Ends with a complete, terminated record.
    Clean,
    /// Header-only table whose header lost its `\n`.
    Unterminated,
    /// The last record is a crash remnant; committed data ends at `committed_len`.
    Torn { committed_len: u64 },
}

#[derive(Debug)]
struct TableScan {
    rows: u64,
    tail: Tail,
}

/// Create the table with only the header row, unless it already exists.
///
/// Idempotent: an existing, healthy table is left untouched. An existing
/// table whose last record was cut short by a crash is repaired by
/// truncating that record. A zero-length file is treated as absent.
pub fn ensure_table(path: &Path) -> Result<(), News2CsvError> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => {
            let scan = scan_table(path)?;
            repair_tail(path, scan.tail)
        }
        Ok(_) => create_with_header(path, true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => create_with_header(path, false),
        Err(e) => Err(corrupt(path, format!("cannot stat table: {}", e))),
    }
}

/// The id the next appended record will receive: data row count + 1.
///
/// # Errors
/// [`News2CsvError::TableCorrupt`] if the table is missing, unreadable, has
/// the wrong header, or contains a malformed row before its last record.
pub fn next_id(path: &Path) -> Result<u64, News2CsvError> {
    let scan = scan_table(path)?;
    Ok(scan.rows + 1)
}

/// Append records as new rows, in the given order.
///
/// Never writes a header. Either the whole batch lands or, on an I/O error,
/// the table is truncated back to its prior length.
pub fn append(path: &Path, records: &[ArticleRecord]) -> Result<(), News2CsvError> {
    if records.is_empty() {
        return Ok(());
    }
    let buf = encode_rows(records)?;

    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .open(path)
        .map_err(|e| write_failed(path, e))?;
    let len = file.metadata().map_err(|e| write_failed(path, e))?.len();

    if len == 0 {
        return Err(corrupt(path, "table has no header row".into()));
    }
    if last_byte(&mut file, len).map_err(|e| write_failed(path, e))? != b'\n' {
        return Err(corrupt(
            path,
            "table does not end with a complete row; run ensure_table first".into(),
        ));
    }

    write_or_rollback(&mut file, &buf, len).map_err(|e| write_failed(path, e))?;

    debug!(
        "Appended {} row(s) ({} bytes) to '{}'",
        records.len(),
        buf.len(),
        path.display()
    );
    Ok(())
}

/// Read every row back as an [`ArticleRecord`].
pub fn read_records(path: &Path) -> Result<Vec<ArticleRecord>, News2CsvError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| corrupt(path, format!("unreadable: {}", e)))?;

    let headers = rdr
        .headers()
        .map_err(|e| corrupt(path, format!("unreadable header: {}", e)))?;
    check_header(path, headers.iter())?;

    let mut out = Vec::new();
    for (i, row) in rdr.records().enumerate() {
        let row = row.map_err(|e| corrupt(path, format!("row {}: {}", i + 1, e)))?;
        out.push(decode_row(path, i + 1, &row)?);
    }
    Ok(out)
}

// ── Creation ─────────────────────────────────────────────────────────────────

fn create_with_header(path: &Path, replace_empty: bool) -> Result<(), News2CsvError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| write_failed(path, e))?;

    let header = encode_header()?;
    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| write_failed(path, e))?;
    tmp.write_all(&header)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| write_failed(path, e))?;

    // Temp file + rename: readers never observe a half-written header.
    let persisted = if replace_empty {
        tmp.persist(path).map(|_| ())
    } else {
        tmp.persist_noclobber(path).map(|_| ())
    };

    match persisted {
        Ok(()) => {
            info!("Created table '{}'", path.display());
            Ok(())
        }
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
            debug!("Table '{}' appeared concurrently; keeping it", path.display());
            Ok(())
        }
        Err(e) => Err(write_failed(path, e.error)),
    }
}

// ── Scanning & repair ────────────────────────────────────────────────────────

fn scan_table(path: &Path) -> Result<TableScan, News2CsvError> {
    let bytes = fs::read(path).map_err(|e| corrupt(path, format!("unreadable: {}", e)))?;

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes.as_slice());
    let mut record = csv::ByteRecord::new();

    match rdr.read_byte_record(&mut record) {
        Ok(true) => {
            let fields = record.iter().map(|f| String::from_utf8_lossy(f).into_owned());
            check_header(path, fields)?;
        }
        Ok(false) => return Err(corrupt(path, "table is empty (no header row)".into())),
        Err(e) => return Err(corrupt(path, format!("unreadable header: {}", e))),
    }

    let mut rows = 0u64;
    let mut committed_len = rdr.position().byte();
    let mut last_row_start = committed_len;

    loop {
        let complete = match rdr.read_byte_record(&mut record) {
            Ok(false) => break,
            Ok(true) => is_complete_row(&record),
            Err(_) => false,
        };

        if complete {
            rows += 1;
            last_row_start = committed_len;
            committed_len = rdr.position().byte();
            continue;
        }

        // A malformed record is only acceptable as the very last one.
        let at_eof = matches!(rdr.read_byte_record(&mut record), Ok(false));
        if at_eof {
            return Ok(TableScan {
                rows,
                tail: Tail::Torn { committed_len },
            });
        }
        return Err(corrupt(
            path,
            format!("malformed row {} (line structure damaged)", rows + 1),
        ));
    }

    // Every append ends with `\n` outside any quoted cell. A last row that
    // lacks it, or that leaves a quote open, was cut off mid-write even when
    // the reader closed it into seven plausible fields.
    let open_quote = bytes.iter().filter(|&&b| b == b'"').count() % 2 == 1;
    let terminated = bytes.ends_with(b"\n") && !open_quote;

    let scan = match (terminated, rows) {
        (true, _) => TableScan {
            rows,
            tail: Tail::Clean,
        },
        (false, 0) => TableScan {
            rows,
            tail: Tail::Unterminated,
        },
        (false, _) => TableScan {
            rows: rows - 1,
            tail: Tail::Torn {
                committed_len: last_row_start,
            },
        },
    };
    Ok(scan)
}

/// A data row is complete when it has every column, a numeric id, and a
/// glossary cell that decodes as a JSON object.
fn is_complete_row(record: &csv::ByteRecord) -> bool {
    if record.len() != TABLE_COLUMNS.len() {
        return false;
    }
    let id_ok = std::str::from_utf8(&record[0])
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .is_some();
    let glossary_ok = std::str::from_utf8(&record[6])
        .ok()
        .and_then(ArticleRecord::glossary_from_cell)
        .is_some();
    id_ok && glossary_ok
}

fn repair_tail(path: &Path, tail: Tail) -> Result<(), News2CsvError> {
    match tail {
        Tail::Clean => Ok(()),
        Tail::Unterminated => {
            warn!(
                "Table '{}' header is missing its newline; completing it",
                path.display()
            );
            let mut file = OpenOptions::new()
                .append(true)
                .open(path)
                .map_err(|e| write_failed(path, e))?;
            file.write_all(b"\n")
                .and_then(|_| file.sync_data())
                .map_err(|e| write_failed(path, e))
        }
        Tail::Torn { committed_len } => {
            warn!(
                "Table '{}' ends with an incomplete row (crash during append?); \
                 truncating to {} bytes",
                path.display(),
                committed_len
            );
            let file = OpenOptions::new()
                .write(true)
                .open(path)
                .map_err(|e| write_failed(path, e))?;
            file.set_len(committed_len)
                .and_then(|_| file.sync_data())
                .map_err(|e| write_failed(path, e))
        }
    }
}

/// A file an append can be committed to and rolled back from.
trait AppendTarget: Write {
    fn sync(&mut self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl AppendTarget for fs::File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Write the whole batch and sync it, or cut the target back to `prior_len`.
fn write_or_rollback<T: AppendTarget>(target: &mut T, buf: &[u8], prior_len: u64) -> io::Result<()> {
    if let Err(e) = target.write_all(buf).and_then(|_| target.sync()) {
        if let Err(te) = target.truncate(prior_len) {
            warn!("Could not roll back partial append: {}", te);
        }
        return Err(e);
    }
    Ok(())
}

fn last_byte(file: &mut fs::File, len: u64) -> io::Result<u8> {
    let mut b = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut b)?;
    Ok(b[0])
}

// ── Encoding ─────────────────────────────────────────────────────────────────

fn csv_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new())
}

fn encode_header() -> Result<Vec<u8>, News2CsvError> {
    let mut w = csv_writer();
    w.write_record(TABLE_COLUMNS)
        .map_err(|e| News2CsvError::Internal(format!("CSV encode failed: {}", e)))?;
    w.into_inner()
        .map_err(|e| News2CsvError::Internal(format!("CSV flush failed: {}", e)))
}

fn encode_rows(records: &[ArticleRecord]) -> Result<Vec<u8>, News2CsvError> {
    let mut w = csv_writer();
    for r in records {
        w.write_record([
            r.article_id.to_string(),
            r.title.clone(),
            r.involvement.clone(),
            r.past.clone(),
            r.present.clone(),
            r.points_cell(),
            r.glossary_cell(),
        ])
        .map_err(|e| News2CsvError::Internal(format!("CSV encode failed: {}", e)))?;
    }
    w.into_inner()
        .map_err(|e| News2CsvError::Internal(format!("CSV flush failed: {}", e)))
}

fn decode_row(
    path: &Path,
    row_num: usize,
    row: &csv::StringRecord,
) -> Result<ArticleRecord, News2CsvError> {
    if row.len() != TABLE_COLUMNS.len() {
        return Err(corrupt(
            path,
            format!("row {} has {} columns, expected {}", row_num, row.len(), TABLE_COLUMNS.len()),
        ));
    }
    let article_id = row[0]
        .trim()
        .parse::<u64>()
        .map_err(|_| corrupt(path, format!("row {}: articleId '{}' is not a number", row_num, &row[0])))?;
    let glossary = ArticleRecord::glossary_from_cell(&row[6])
        .ok_or_else(|| corrupt(path, format!("row {}: glossary is not a JSON object", row_num)))?;

    Ok(ArticleRecord {
        article_id,
        title: row[1].to_string(),
        involvement: row[2].to_string(),
        past: row[3].to_string(),
        present: row[4].to_string(),
        points: ArticleRecord::points_from_cell(&row[5]),
        glossary,
    })
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn check_header<I, S>(path: &Path, fields: I) -> Result<(), News2CsvError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let found: Vec<String> = fields
        .into_iter()
        .map(|f| f.as_ref().trim_start_matches('\u{FEFF}').to_string())
        .collect();
    if found.iter().map(String::as_str).eq(TABLE_COLUMNS.iter().copied()) {
        Ok(())
    } else {
        Err(corrupt(
            path,
            format!("unexpected header [{}]", found.join(",")),
        ))
    }
}

fn corrupt(path: &Path, detail: String) -> News2CsvError {
    News2CsvError::TableCorrupt {
        path: path.to_path_buf(),
        detail,
    }
}

fn write_failed(path: &Path, source: io::Error) -> News2CsvError {
    News2CsvError::TableWriteFailed {
        path: path.to_path_buf(),
        source,
    }
}
