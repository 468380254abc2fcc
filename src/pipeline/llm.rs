//! Inference interaction: send one page image with the extraction
//! instruction and hand the answer to the parser.
//!
//! The network call sits behind [`InferenceBackend`] so the pipeline can run
//! against a deterministic stub in tests. [`GeminiClient`] is the production
//! implementation for the Gemini `generateContent` REST API.
//!
//! Every image gets exactly one attempt; there is no retry loop. A failure
//! is reported as an [`ImageError`] and the archive scan moves on to the
//! next image.

use crate::config::ExtractionConfig;
use crate::error::{ImageError, InferenceError, News2CsvError};
use crate::pipeline::encode::InlineImage;
use crate::pipeline::parse::{self, RawArticle};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Capability to turn (instruction, image) into the model's raw answer text.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Perform a single inference call.
    async fn send(&self, image: &InlineImage, instruction: &str) -> Result<String, InferenceError>;
}

// ── Wire types ───────────────────────────────────────────────────────────────

/// Request body of `models/{model}:generateContent`.
#[derive(Debug, Serialize)]
pub struct GenerateRequest<'a> {
    pub contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
pub struct RequestContent<'a> {
    pub parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RequestPart<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineDataRef<'a> },
}

#[derive(Debug, Serialize)]
pub struct InlineDataRef<'a> {
    pub mime_type: &'a str,
    pub data: &'a str,
}

impl<'a> GenerateRequest<'a> {
    /// Instruction first, then the image, in a single content turn.
    pub fn new(instruction: &'a str, image: &'a InlineImage) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::Text { text: instruction },
                    RequestPart::InlineData {
                        inline_data: InlineDataRef {
                            mime_type: &image.mime_type,
                            data: &image.data,
                        },
                    },
                ],
            }],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Pull `candidates[0].content.parts[0].text` out of a success body.
pub fn extract_candidate_text(body: &str) -> Result<String, InferenceError> {
    let envelope: GenerateResponse =
        serde_json::from_str(body).map_err(|_| InferenceError::Envelope(body.to_string()))?;

    envelope
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .map(|t| t.trim().to_string())
        .ok_or_else(|| InferenceError::Envelope(body.to_string()))
}

// ── Gemini backend ───────────────────────────────────────────────────────────

/// [`InferenceBackend`] for the Gemini REST API, authenticated by API key.
pub struct GeminiClient {
    http: reqwest::Client,
    url: Url,
}

impl GeminiClient {
    /// Build a client for `{endpoint}/models/{model}:generateContent?key={api_key}`.
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, News2CsvError> {
        let url = generate_content_url(endpoint, model, api_key)?;

        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let http = builder
            .build()
            .map_err(|e| News2CsvError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, url })
    }

    /// Build a client from the run configuration.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, News2CsvError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| News2CsvError::ProviderNotConfigured {
                provider: "gemini".into(),
                hint: "Set GEMINI_API_KEY (or pass --api-key), or inject a backend via \
                       ExtractionConfigBuilder::backend."
                    .into(),
            })?;

        Self::new(
            &config.endpoint,
            &config.model,
            api_key,
            config.api_timeout_secs.map(Duration::from_secs),
        )
    }
}

/// Full request URL; the key travels as a query parameter.
pub fn generate_content_url(
    endpoint: &str,
    model: &str,
    api_key: &str,
) -> Result<Url, News2CsvError> {
    let raw = format!(
        "{}/models/{}:generateContent",
        endpoint.trim_end_matches('/'),
        model
    );
    let mut url = Url::parse(&raw)
        .map_err(|e| News2CsvError::InvalidConfig(format!("Invalid endpoint '{}': {}", raw, e)))?;
    url.query_pairs_mut().append_pair("key", api_key);
    Ok(url)
}

#[async_trait]
impl InferenceBackend for GeminiClient {
    async fn send(&self, image: &InlineImage, instruction: &str) -> Result<String, InferenceError> {
        let body = GenerateRequest::new(instruction, image);

        let response = self
            .http
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| InferenceError::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        extract_candidate_text(&text)
    }
}

// ── Per-image step ───────────────────────────────────────────────────────────

/// Send one encoded image and parse the answer into article objects.
///
/// Never returns a fatal error: any failure is an [`ImageError`] naming
/// `image_name`, so the caller can log it and continue with the next image.
pub async fn process_image(
    backend: &dyn InferenceBackend,
    image_name: &str,
    image: &InlineImage,
    instruction: &str,
    excerpt_chars: usize,
) -> Result<Vec<RawArticle>, ImageError> {
    let text = backend.send(image, instruction).await.map_err(|e| {
        warn!("{}: inference failed: {}", image_name, e);
        ImageError::from_inference(image_name, e, excerpt_chars)
    })?;

    debug!("{}: {} chars of response text", image_name, text.len());

    parse::parse_articles(&text, excerpt_chars).map_err(|f| {
        warn!(
            "{}: malformed response ({}), raw output: {}",
            image_name, f.kind, f.excerpt
        );
        ImageError::MalformedResponse {
            image: image_name.to_string(),
            kind: f.kind,
            excerpt: f.excerpt,
        }
    })
}
