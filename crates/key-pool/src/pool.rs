//! Ordered credential pool with a wrapping rotation pointer
//!
//! The pool only selects and rotates. It does not remember which keys were
//! already tried for a request; the completion client bounds retries itself.

use common::Secret;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Snapshot of the pool position for health reporting. Never carries key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub current_index: usize,
    pub total_credentials: usize,
}

/// Ordered list of interchangeable API keys plus the index of the active one.
///
/// Invariant: `current_index < credentials.len()` whenever the pool is non-empty.
/// An empty pool is permanently degraded until the process restarts.
pub struct CredentialPool {
    credentials: Vec<Secret<String>>,
    current_index: usize,
}

impl CredentialPool {
    /// Create a pool starting at `start_index`.
    ///
    /// An out-of-range start index wraps modulo the pool size.
    pub fn new(credentials: Vec<Secret<String>>, start_index: usize) -> Self {
        let total = credentials.len();
        let current_index = if total == 0 {
            0
        } else {
            if start_index >= total {
                warn!(
                    start_index,
                    total, "start index out of range, wrapping around pool size"
                );
            }
            start_index % total
        };

        if total == 0 {
            warn!("credential pool is empty, AI completions are unavailable");
        } else {
            info!(credentials = total, current_index, "credential pool initialized");
        }

        Self {
            credentials,
            current_index,
        }
    }

    /// Build a pool from a comma-separated key list (the `GEMINI_API_KEYS` format).
    pub fn from_list(raw: &str, start_index: usize) -> Self {
        Self::new(common::parse_secret_list(raw), start_index)
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// The active credential.
    pub fn current(&self) -> Result<&Secret<String>> {
        self.credentials
            .get(self.current_index)
            .ok_or(Error::EmptyPool)
    }

    /// Rotate to the next credential, wrapping at the end, and return it.
    ///
    /// Fails without touching the index when there is nothing to rotate to.
    pub fn advance(&mut self) -> Result<&Secret<String>> {
        let total = self.credentials.len();
        if total <= 1 {
            warn!(total, "no alternate credential to rotate to");
            return Err(Error::NoAlternateCredential { total });
        }
        self.current_index = (self.current_index + 1) % total;
        info!(
            credential_index = self.current_index,
            "rotated to next credential"
        );
        Ok(&self.credentials[self.current_index])
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            current_index: self.current_index,
            total_credentials: self.credentials.len(),
        }
    }
}

impl std::fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPool")
            .field("total_credentials", &self.credentials.len())
            .field("current_index", &self.current_index)
            .finish()
    }
}
