//! Error types for pool and completion operations

use provider::RemoteError;

/// Why a completion request produced no answer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no credentials configured")]
    EmptyPool,

    #[error("no alternate credential to rotate to ({total} configured)")]
    NoAlternateCredential { total: usize },

    #[error("no usable credential: {0}")]
    Unconfigured(String),

    #[error("remote request failed: {0}")]
    Remote(RemoteError),

    #[error("remote request failed after rotation: {0}")]
    RetryFailed(RemoteError),

    #[error("remote returned no text")]
    EmptyResponse,
}

impl Error {
    /// Label for the `completion_requests_total` outcome dimension.
    pub fn outcome(&self) -> &'static str {
        match self {
            Error::EmptyPool | Error::Unconfigured(_) => "unavailable",
            Error::NoAlternateCredential { .. } => "no_alternate",
            Error::Remote(_) => "remote_error",
            Error::RetryFailed(_) => "retry_failed",
            Error::EmptyResponse => "empty",
        }
    }
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use provider::RemoteErrorKind;

    #[test]
    fn display_messages_are_descriptive() {
        assert_eq!(Error::EmptyPool.to_string(), "no credentials configured");
        assert_eq!(
            Error::NoAlternateCredential { total: 1 }.to_string(),
            "no alternate credential to rotate to (1 configured)"
        );
        let remote = RemoteError::new(RemoteErrorKind::Transport, "network timeout");
        assert_eq!(
            Error::Remote(remote).to_string(),
            "remote request failed: transport: network timeout"
        );
    }

    #[test]
    fn outcome_labels_are_distinct_per_variant() {
        let remote = RemoteError::new(RemoteErrorKind::Status(500), "boom");
        let labels = [
            Error::EmptyPool.outcome(),
            Error::NoAlternateCredential { total: 1 }.outcome(),
            Error::Remote(remote.clone()).outcome(),
            Error::RetryFailed(remote).outcome(),
            Error::EmptyResponse.outcome(),
        ];
        let mut deduped = labels.to_vec();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), labels.len());
        assert_eq!(Error::Unconfigured("x".into()).outcome(), "unavailable");
    }
}
