//! Quota detection for remote completion failures
//!
//! A failure counts as quota/limit exhaustion when its textual description
//! contains "quota" or "limit", case-insensitively. It fires on any message
//! mentioning a limit and misses provider text that uses neither word. Only a match triggers rotation to the next key.

use provider::{ErrorClassification, RemoteError};

/// Substrings that mark a failure as quota or rate-limit exhaustion.
const QUOTA_PATTERNS: &[&str] = &["quota", "limit"];

/// Classify a failure description.
pub fn classify_message(message: &str) -> ErrorClassification {
    let lower = message.to_lowercase();
    if QUOTA_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        ErrorClassification::QuotaExceeded
    } else {
        ErrorClassification::Other
    }
}

/// Classify a structured remote failure by its full description.
pub fn classify_failure(error: &RemoteError) -> ErrorClassification {
    classify_message(&error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider::RemoteErrorKind;

    #[test]
    fn quota_message_is_quota_exceeded() {
        assert_eq!(
            classify_message("Quota exceeded for key"),
            ErrorClassification::QuotaExceeded
        );
    }

    #[test]
    fn limit_message_is_quota_exceeded() {
        assert_eq!(
            classify_message("Rate limit reached for requests"),
            ErrorClassification::QuotaExceeded
        );
    }

    #[test]
    fn match_is_case_insensitive() {
        assert_eq!(
            classify_message("QUOTA_EXHAUSTED"),
            ErrorClassification::QuotaExceeded
        );
        assert_eq!(
            classify_message("RateLimitError"),
            ErrorClassification::QuotaExceeded
        );
    }

    #[test]
    fn network_timeout_is_other() {
        assert_eq!(
            classify_message("network timeout"),
            ErrorClassification::Other
        );
    }

    #[test]
    fn unrelated_limit_mention_still_matches() {
        // Over-triggering is part of the heuristic
        assert_eq!(
            classify_message("prompt exceeds the token limit of the model"),
            ErrorClassification::QuotaExceeded
        );
    }

    #[test]
    fn resource_exhausted_without_keywords_is_other() {
        assert_eq!(
            classify_message("RESOURCE_EXHAUSTED"),
            ErrorClassification::Other
        );
    }

    #[test]
    fn classify_failure_reads_message_of_any_kind() {
        let status = RemoteError::new(
            RemoteErrorKind::Status(429),
            "RESOURCE_EXHAUSTED: Resource has been exhausted (e.g. check quota).",
        );
        assert_eq!(
            classify_failure(&status),
            ErrorClassification::QuotaExceeded
        );

        let transport = RemoteError::new(RemoteErrorKind::Transport, "connection refused");
        assert_eq!(classify_failure(&transport), ErrorClassification::Other);

        let decode = RemoteError::new(RemoteErrorKind::Decode, "daily limit body was not JSON");
        assert_eq!(
            classify_failure(&decode),
            ErrorClassification::QuotaExceeded
        );
    }
}
