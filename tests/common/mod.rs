//! Shared fixtures for the integration tests: in-memory archives, a scripted
//! inference backend and a throwaway uploads directory.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use edgequake_news2csv::{ExtractionConfig, InferenceBackend, InferenceError, InlineImage};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const HEADER: &str = "articleId,title,involvement,past,present,points,glossary\n";

/// Build a zip archive from `(name, bytes)` pairs; names ending in `/` become directories.
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default();
    for (name, bytes) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, opts).expect("add dir");
        } else {
            zip.start_file(*name, opts).expect("start file");
            zip.write_all(bytes).expect("write entry");
        }
    }
    zip.finish().expect("finish zip").into_inner()
}

/// Answer text for a page holding `titles.len()` articles.
pub fn articles_json(titles: &[&str]) -> String {
    let items: Vec<serde_json::Value> = titles
        .iter()
        .map(|t| {
            serde_json::json!({
                "title": t,
                "involvement": format!("{t}: who is involved."),
                "past": "Background.",
                "present": "Current situation.",
                "points": [format!("{t} first."), format!("{t} second.")],
                "glossary": {"term": "definition"}
            })
        })
        .collect();
    serde_json::Value::Array(items).to_string()
}

/// Scripted [`InferenceBackend`]: the answer is chosen by the raw image bytes.
///
/// Unknown images get `[]`. Every call is recorded as `(mime_type, bytes)`.
#[derive(Default)]
pub struct StubBackend {
    answers: HashMap<Vec<u8>, Result<String, InferenceError>>,
    pub calls: Mutex<Vec<(String, Vec<u8>)>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, image: &[u8], text: impl Into<String>) -> Self {
        self.answers.insert(image.to_vec(), Ok(text.into()));
        self
    }

    pub fn fail(mut self, image: &[u8], err: InferenceError) -> Self {
        self.answers.insert(image.to_vec(), Err(err));
        self
    }

    /// Raw bytes of every image sent, in call order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, b)| b.clone())
            .collect()
    }
}

#[async_trait]
impl InferenceBackend for StubBackend {
    async fn send(&self, image: &InlineImage, _instruction: &str) -> Result<String, InferenceError> {
        let bytes = STANDARD
            .decode(&image.data)
            .map_err(|e| InferenceError::Transport(e.to_string()))?;
        self.calls
            .lock()
            .unwrap()
            .push((image.mime_type.clone(), bytes.clone()));
        self.answers
            .get(&bytes)
            .cloned()
            .unwrap_or_else(|| Ok("[]".to_string()))
    }
}

/// Route library logs to the test harness; `RUST_LOG` controls the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Config pointing at a fresh temp uploads dir and the given backend.
pub fn config_with(backend: Arc<StubBackend>) -> (TempDir, ExtractionConfig) {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let config = ExtractionConfig::builder()
        .uploads_dir(dir.path().join("uploads"))
        .backend(backend as Arc<dyn InferenceBackend>)
        .build()
        .expect("valid config");
    (dir, config)
}

/// Same uploads dir, different backend: simulates a later run.
pub fn reconfigure(config: &ExtractionConfig, backend: Arc<StubBackend>) -> ExtractionConfig {
    ExtractionConfig::builder()
        .uploads_dir(config.uploads_dir.clone())
        .backend(backend as Arc<dyn InferenceBackend>)
        .build()
        .expect("valid config")
}
