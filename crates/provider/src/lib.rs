//! Backend abstraction for the remote generative-AI endpoint
//!
//! Defines the `CompletionBackend` trait that decouples the credential-rotation
//! logic from the wire protocol of a particular provider. `GeminiBackend` talks
//! to Google's `generateContent` API; tests substitute scripted backends.
//!
//! Failures come back as a structured `RemoteError` instead of an opaque
//! exception, so callers classify them explicitly (see `ErrorClassification`).

pub mod gemini;

pub use gemini::GeminiBackend;

use common::Secret;
use reqwest::header::HeaderValue;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Classification of a remote failure to decide between rotation and giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// Quota or rate limit exhausted on the active credential: rotate and retry once
    QuotaExceeded,
    /// Anything else: surface the generic error placeholder, no rotation
    Other,
}

/// What went wrong on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Endpoint answered with a non-success HTTP status
    Status(u16),
    /// Request never completed (connect, DNS, timeout)
    Transport,
    /// Success status but the body could not be decoded
    Decode,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteErrorKind::Status(code) => write!(f, "status {code}"),
            RemoteErrorKind::Transport => write!(f, "transport"),
            RemoteErrorKind::Decode => write!(f, "decode"),
        }
    }
}

/// Failure of a single completion request, carrying the provider's
/// human-readable description.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Errors from binding a credential before any request is issued.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
}

/// Result alias for provider configuration.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// A credential bound for use in requests.
///
/// Holds the key as a sensitive header value so it never shows up in logs or
/// Debug output. Produced by `CompletionBackend::configure`.
#[derive(Clone)]
pub struct ActiveConfig {
    api_key: HeaderValue,
}

impl ActiveConfig {
    /// Validate a credential and bind it as a header value.
    ///
    /// Rejects blank keys and keys containing bytes not allowed in HTTP headers.
    pub fn from_credential(credential: &Secret<String>) -> Result<Self> {
        let raw = credential.expose().trim();
        if raw.is_empty() {
            return Err(ProviderError::InvalidCredential("credential is empty".into()));
        }
        let mut api_key = HeaderValue::from_str(raw).map_err(|_| {
            ProviderError::InvalidCredential("credential is not a valid header value".into())
        })?;
        api_key.set_sensitive(true);
        Ok(Self { api_key })
    }

    pub fn api_key(&self) -> &HeaderValue {
        &self.api_key
    }
}

impl fmt::Debug for ActiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveConfig")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Future returned by `CompletionBackend::generate`.
pub type GenerateFuture<'a> =
    Pin<Box<dyn Future<Output = std::result::Result<String, RemoteError>> + Send + 'a>>;

/// Abstraction over a text-completion endpoint.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn CompletionBackend>`).
pub trait CompletionBackend: Send + Sync {
    /// Identifier for logging (e.g. "gemini")
    fn id(&self) -> &str;

    /// Bind a credential for subsequent requests.
    fn configure(&self, credential: &Secret<String>) -> Result<ActiveConfig> {
        ActiveConfig::from_credential(credential)
    }

    /// Issue one completion request for `prompt` with the bound credential.
    ///
    /// `Ok` carries the raw returned text, which may be empty. Trimming and
    /// placeholder selection are the caller's job.
    fn generate<'a>(&'a self, config: &'a ActiveConfig, prompt: &'a str) -> GenerateFuture<'a>;
}
