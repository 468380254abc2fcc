//! Configuration types for archive extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Everything the pipeline needs (endpoint,
//! key, table folder, backend) travels in this one value, so tests can point a
//! run at a stub backend and an isolated temp directory without touching any
//! process-wide state.

use crate::error::News2CsvError;
use crate::pipeline::llm::InferenceBackend;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default base URL of the Gemini `generateContent` API.
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1";

/// Default multimodal model.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Default folder holding accumulated tables.
pub const DEFAULT_UPLOADS_DIR: &str = "uploads";

/// Maximum characters of offending text kept in a `MalformedResponse`.
pub const DEFAULT_EXCERPT_CHARS: usize = 500;

/// Configuration for one archive-processing run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_news2csv::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .api_key("my-key")
///     .uploads_dir("/var/lib/news2csv")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// API key sent as the `key` query parameter. Required unless `backend` is set.
    pub api_key: Option<String>,

    /// Base URL of the inference API. Default: [`DEFAULT_ENDPOINT`].
    ///
    /// The request goes to `{endpoint}/models/{model}:generateContent`.
    pub endpoint: String,

    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Folder where accumulated tables live. Default: `uploads`.
    ///
    /// Archive `foo.zip` accumulates into `{uploads_dir}/foo_articles.csv`.
    pub uploads_dir: PathBuf,

    /// Custom extraction instruction. If None, uses [`crate::prompts::EXTRACTION_PROMPT`].
    pub instruction: Option<String>,

    /// Pre-constructed inference backend. Takes precedence over `api_key`/`endpoint`.
    pub backend: Option<Arc<dyn InferenceBackend>>,

    /// Optional progress callback for per-image events.
    pub progress_callback: Option<ProgressCallback>,

    /// Per-request timeout in seconds. Default: None (wait indefinitely).
    ///
    /// A hung request blocks the rest of the archive, since images are
    /// processed one at a time.
    pub api_timeout_secs: Option<u64>,

    /// Maximum characters of response text kept for diagnostics. Default: 500.
    pub excerpt_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            uploads_dir: PathBuf::from(DEFAULT_UPLOADS_DIR),
            instruction: None,
            backend: None,
            progress_callback: None,
            api_timeout_secs: None,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("uploads_dir", &self.uploads_dir)
            .field("instruction", &self.instruction.as_ref().map(|s| s.len()))
            .field("backend", &self.backend.as_ref().map(|_| "<dyn InferenceBackend>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("excerpt_chars", &self.excerpt_chars)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Path of the accumulation table for the given table file name.
    pub fn table_path(&self, table_name: &str) -> PathBuf {
        self.uploads_dir.join(table_name)
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn uploads_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.uploads_dir = dir.into();
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.config.instruction = Some(instruction.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    /// Attach a progress callback invoked as each image is processed.
    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn excerpt_chars(mut self, n: usize) -> Self {
        self.config.excerpt_chars = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, News2CsvError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(News2CsvError::InvalidConfig("Model must not be empty".into()));
        }
        if reqwest::Url::parse(&c.endpoint).is_err() {
            return Err(News2CsvError::InvalidConfig(format!(
                "Endpoint is not a valid URL: '{}'",
                c.endpoint
            )));
        }
        if c.excerpt_chars == 0 {
            return Err(News2CsvError::InvalidConfig(
                "Excerpt length must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == Some(0) {
            return Err(News2CsvError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}
