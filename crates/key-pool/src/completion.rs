//! Completion client with single-shot key rotation
//!
//! Wraps a `CompletionBackend` with the credential pool. A request runs on the
//! currently bound key; a failure classified as quota exhaustion advances the
//! pool, rebinds, and retries exactly once. Callers always get text back: the
//! model's answer or one of three placeholders.
//!
//! The pool index and the bound configuration sit behind one async mutex held
//! for the whole request, so rotation never interleaves with another caller's
//! attempt. Each retry reads the pool state as it is at that moment. Health
//! reporting reads a separately published snapshot and never waits on that
//! mutex.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use common::Secret;
use provider::{ActiveConfig, CompletionBackend, ErrorClassification};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Error, Result};
use crate::pool::{CredentialPool, PoolStatus};
use crate::prompt::PromptTemplate;
use crate::quota::classify_failure;

/// User-facing texts returned instead of a generated answer.
#[derive(Debug, Clone)]
pub struct Placeholders {
    /// No usable credential: empty pool or every key failed to bind
    pub unavailable: String,
    /// Remote failure that rotation did not (or could not) fix
    pub generic_error: String,
    /// Remote succeeded but produced no text
    pub rephrase: String,
}

impl Default for Placeholders {
    fn default() -> Self {
        Self {
            unavailable: "❌ Sorry, the AI assistant is currently unavailable.".to_string(),
            generic_error: "❌ Sorry, something went wrong with the AI assistant. \
                            Please try again later or contact us directly."
                .to_string(),
            rephrase: "Sorry, I couldn't understand your question. Please rephrase it."
                .to_string(),
        }
    }
}

impl Placeholders {
    /// Pick the placeholder for a failed request.
    pub fn for_error(&self, error: &Error) -> &str {
        match error {
            Error::EmptyPool | Error::Unconfigured(_) => self.unavailable.as_str(),
            Error::EmptyResponse => self.rephrase.as_str(),
            Error::NoAlternateCredential { .. } | Error::Remote(_) | Error::RetryFailed(_) => {
                self.generic_error.as_str()
            }
        }
    }
}

/// Credential pool snapshot plus whether a usable key is currently bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyInfo {
    #[serde(flatten)]
    pub pool: PoolStatus,
    pub has_model: bool,
}

struct ClientState {
    pool: CredentialPool,
    active: Option<ActiveConfig>,
}

impl ClientState {
    /// Bind the pool's current key, walking forward past keys that fail to bind.
    ///
    /// Tries at most `candidates` keys. Leaves `active` empty when nothing binds.
    fn rebind(&mut self, backend: &dyn CompletionBackend, candidates: usize) {
        self.active = None;
        let total = self.pool.len();
        for attempt in 0..candidates.min(total) {
            if attempt > 0 && self.pool.advance().is_err() {
                break;
            }
            let index = self.pool.current_index();
            let bound = self
                .pool
                .current()
                .and_then(|key| bind(backend, key));
            match bound {
                Ok(config) => {
                    info!(credential_index = index, backend = backend.id(), "credential bound");
                    self.active = Some(config);
                    return;
                }
                Err(e) => {
                    warn!(credential_index = index, error = %e, "failed to bind credential");
                }
            }
        }
        error!(total, candidates, "no usable credential in pool");
    }

    fn active_or_unavailable(&self) -> Result<ActiveConfig> {
        match (&self.active, self.pool.is_empty()) {
            (Some(config), _) => Ok(config.clone()),
            (None, true) => Err(Error::EmptyPool),
            (None, false) => Err(Error::Unconfigured(format!(
                "none of the {} configured credentials could be bound",
                self.pool.len()
            ))),
        }
    }
}

fn bind(backend: &dyn CompletionBackend, key: &Secret<String>) -> Result<ActiveConfig> {
    backend
        .configure(key)
        .map_err(|e| Error::Unconfigured(e.to_string()))
}

/// Trim the returned text; blank output counts as an empty response.
fn finish(text: String) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        warn!("remote returned empty text");
        return Err(Error::EmptyResponse);
    }
    Ok(trimmed.to_string())
}

/// Last published pool position and binding status.
#[derive(Debug)]
struct Snapshot {
    current_index: AtomicUsize,
    total_credentials: usize,
    has_model: AtomicBool,
}

impl Snapshot {
    fn of(state: &ClientState) -> Self {
        let status = state.pool.status();
        Self {
            current_index: AtomicUsize::new(status.current_index),
            total_credentials: status.total_credentials,
            has_model: AtomicBool::new(state.active.is_some()),
        }
    }

    fn publish(&self, state: &ClientState) {
        self.current_index
            .store(state.pool.current_index(), Ordering::Relaxed);
        self.has_model
            .store(state.active.is_some(), Ordering::Relaxed);
    }
}

/// Completion client owning the credential pool.
///
/// Constructed once and shared via `Arc`; there is no global instance.
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    template: PromptTemplate,
    placeholders: Placeholders,
    state: Mutex<ClientState>,
    snapshot: Snapshot,
}

impl CompletionClient {
    /// Create a client and bind the pool's starting key.
    pub fn new(
        pool: CredentialPool,
        backend: Arc<dyn CompletionBackend>,
        template: PromptTemplate,
        placeholders: Placeholders,
    ) -> Self {
        let mut state = ClientState { pool, active: None };
        let total = state.pool.len();
        state.rebind(backend.as_ref(), total);
        Self {
            backend,
            template,
            placeholders,
            snapshot: Snapshot::of(&state),
            state: Mutex::new(state),
        }
    }

    /// Answer `prompt` using `context`, always returning user-facing text.
    pub async fn generate_response(&self, prompt: &str, context: &str) -> String {
        match self.try_generate(prompt, context).await {
            Ok(text) => {
                metrics::counter!("completion_requests_total", "outcome" => "ok").increment(1);
                text
            }
            Err(e) => {
                metrics::counter!("completion_requests_total", "outcome" => e.outcome())
                    .increment(1);
                match &e {
                    Error::EmptyResponse => warn!(error = %e, "completion produced no answer"),
                    _ => error!(error = %e, "completion failed"),
                }
                self.placeholders.for_error(&e).to_string()
            }
        }
    }

    /// Run the request with at most one quota-triggered rotation and retry.
    #[instrument(skip_all, fields(prompt_chars = prompt.chars().count()))]
    pub async fn try_generate(&self, prompt: &str, context: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        let config = state.active_or_unavailable()?;
        let full_prompt = self.template.compose(context, prompt);

        let first_error = match self.backend.generate(&config, &full_prompt).await {
            Ok(text) => return finish(text),
            Err(e) => e,
        };

        if classify_failure(&first_error) != ErrorClassification::QuotaExceeded {
            return Err(Error::Remote(first_error));
        }

        warn!(
            credential_index = state.pool.current_index(),
            error = %first_error,
            "credential quota exhausted, rotating"
        );
        state.pool.advance()?;
        metrics::counter!("credential_rotations_total").increment(1);

        // Every key except the one that just ran out
        let candidates = state.pool.len() - 1;
        state.rebind(self.backend.as_ref(), candidates);
        self.snapshot.publish(&state);
        let config = state.active_or_unavailable()?;

        debug!(
            credential_index = state.pool.current_index(),
            "retrying with rotated credential"
        );
        match self.backend.generate(&config, &full_prompt).await {
            Ok(text) => finish(text),
            Err(e) => Err(Error::RetryFailed(e)),
        }
    }

    /// Pool position and binding status, for health reporting.
    ///
    /// Does not wait for an in-progress request; a rotation shows up once its
    /// new key is bound.
    pub fn key_info(&self) -> KeyInfo {
        KeyInfo {
            pool: PoolStatus {
                current_index: self.snapshot.current_index.load(Ordering::Relaxed),
                total_credentials: self.snapshot.total_credentials,
            },
            has_model: self.snapshot.has_model.load(Ordering::Relaxed),
        }
    }

    pub fn placeholders(&self) -> &Placeholders {
        &self.placeholders
    }
}
