//! Error types for the edgequake-news2csv library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`News2CsvError`] (**fatal**): the run cannot proceed at all (the
//!   archive will not open, the table is unreadable, no provider is
//!   configured). Returned as `Err(News2CsvError)` from the top-level
//!   `process_*` / `fetch_table` functions.
//!
//! * [`ImageError`] (**non-fatal**): a single page image failed (service
//!   error, unparseable response) but every other page is processed as
//!   usual. Stored inside [`crate::output::ImageOutcome`] so callers can
//!   inspect partial success after the run.
//!
//! [`InferenceError`] is the narrower failure type of an
//! [`crate::pipeline::llm::InferenceBackend`]; the pipeline folds it into an
//! [`ImageError`] for the image being processed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-news2csv library.
///
/// Image-level failures use [`ImageError`] and are stored in
/// [`crate::output::ImageOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum News2CsvError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The payload could not be opened as a zip archive.
    #[error("Archive '{name}' is corrupt: {detail}\nCheck that the upload is a valid .zip file.")]
    ArchiveCorrupt { name: String, detail: String },

    /// The archive file on disk could not be read.
    #[error("Failed to read archive '{path}': {source}")]
    ArchiveReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A caller-supplied archive or table name is not a plain file name.
    #[error("Invalid name '{name}': must be a plain file name without path separators")]
    InvalidName { name: String },

    /// The requested table does not exist.
    #[error("Table '{name}' not found")]
    NotFound { name: String },

    // ── Table errors ──────────────────────────────────────────────────────
    /// The existing table could not be read or does not have the expected shape.
    #[error("Table '{path}' is corrupt: {detail}\nRows are never rewritten; repair or move the file and retry.")]
    TableCorrupt { path: PathBuf, detail: String },

    /// Creating or appending to the table failed at the I/O layer.
    #[error("Failed to write table '{path}': {source}")]
    TableWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Provider errors ───────────────────────────────────────────────────
    /// No backend was injected and no API key is available.
    #[error("Inference provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of a single inference call, as reported by an
/// [`crate::pipeline::llm::InferenceBackend`].
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// The service answered with a non-success HTTP status.
    #[error("inference service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced a response (connect error, timeout, …).
    #[error("inference request failed: {0}")]
    Transport(String),

    /// A success response whose envelope holds no candidate text.
    #[error("response envelope has no candidate text: {0}")]
    Envelope(String),
}

/// What exactly was wrong with a response the service returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedKind {
    /// The text was not valid JSON, even after fence stripping and recovery.
    Parse,
    /// Valid JSON, but neither an array nor a single article object.
    NotAnArray,
    /// The response envelope did not contain `candidates[0].content.parts[0].text`.
    Envelope,
}

impl fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MalformedKind::Parse => "parse failure",
            MalformedKind::NotAnArray => "not an array",
            MalformedKind::Envelope => "missing candidate text",
        };
        f.write_str(s)
    }
}

/// A non-fatal error for a single page image.
///
/// Stored alongside [`crate::output::ImageOutcome`] when an image fails.
/// The archive scan always continues with the next image.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ImageError {
    /// The entry's compressed bytes could not be read from the archive.
    #[error("{image}: archive entry unreadable: {detail}")]
    EntryUnreadable { image: String, detail: String },

    /// The inference call failed (non-success status or transport error).
    #[error("{image}: inference service error{}: {body}", status_suffix(.status))]
    ServiceError {
        image: String,
        status: Option<u16>,
        body: String,
    },

    /// The service answered, but its text could not be turned into articles.
    #[error("{image}: malformed response ({kind}): {excerpt}")]
    MalformedResponse {
        image: String,
        kind: MalformedKind,
        excerpt: String,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl ImageError {
    /// Name of the archive entry the error belongs to.
    pub fn image(&self) -> &str {
        match self {
            ImageError::EntryUnreadable { image, .. }
            | ImageError::ServiceError { image, .. }
            | ImageError::MalformedResponse { image, .. } => image,
        }
    }

    /// Attach an image name to a backend failure.
    pub fn from_inference(image: &str, err: InferenceError, excerpt_chars: usize) -> Self {
        match err {
            InferenceError::Status { status, body } => ImageError::ServiceError {
                image: image.to_string(),
                status: Some(status),
                body,
            },
            InferenceError::Transport(detail) => ImageError::ServiceError {
                image: image.to_string(),
                status: None,
                body: detail,
            },
            InferenceError::Envelope(raw) => ImageError::MalformedResponse {
                image: image.to_string(),
                kind: MalformedKind::Envelope,
                excerpt: crate::pipeline::parse::excerpt(&raw, excerpt_chars),
            },
        }
    }
}
