//! Gemini backend: single-turn `generateContent` requests.
//!
//! URL format: `{base_url}/models/{model}:generateContent`. The API key travels
//! in the `x-goog-api-key` header rather than the query string so it stays out
//! of access logs.

use crate::{ActiveConfig, CompletionBackend, GenerateFuture, RemoteError, RemoteErrorKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Default public endpoint for the Generative Language API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model name.
pub const DEFAULT_MODEL: &str = "gemini-pro";

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// Error envelope: `{"error":{"code":429,"message":"...","status":"RESOURCE_EXHAUSTED"}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate, parts concatenated. Missing pieces yield "".
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Describe a non-success response, preferring the structured error message.
fn describe_error_body(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(status) => format!("{status}: {}", envelope.error.message),
            None => envelope.error.message,
        },
        Err(_) if body.trim().is_empty() => "<no body>".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

/// Google Gemini text backend.
pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl GeminiBackend {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            timeout,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate_content(
        &self,
        config: &ActiveConfig,
        prompt: &str,
    ) -> Result<String, RemoteError> {
        let body = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, config.api_key().clone())
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::new(RemoteErrorKind::Transport, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::new(
                RemoteErrorKind::Status(status.as_u16()),
                describe_error_body(&body),
            ));
        }

        let parsed = response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| RemoteError::new(RemoteErrorKind::Decode, e.to_string()))?;

        let text = parsed.into_text();
        debug!(chars = text.chars().count(), "gemini returned text");
        Ok(text)
    }
}

impl CompletionBackend for GeminiBackend {
    fn id(&self) -> &str {
        "gemini"
    }

    fn generate<'a>(&'a self, config: &'a ActiveConfig, prompt: &'a str) -> GenerateFuture<'a> {
        Box::pin(self.generate_content(config, prompt))
    }
}
