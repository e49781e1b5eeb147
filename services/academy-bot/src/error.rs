//! Service-specific error types

use thiserror::Error;

/// Chat transport errors.
///
/// `TransportAuth` is fatal (the bot token is wrong); `TransportConnect` is
/// retried by the lifecycle state machine and the polling loop. `Api` covers
/// requests Telegram understood but refused, such as editing a deleted message.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Telegram rejected the bot token")]
    TransportAuth,

    #[error("Telegram request failed: {0}")]
    TransportConnect(String),

    #[error("Telegram API error {code}: {description}")]
    Api { code: i64, description: String },
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages_are_descriptive() {
        assert_eq!(
            Error::TransportAuth.to_string(),
            "Telegram rejected the bot token"
        );
        assert!(
            Error::TransportConnect("connection refused".into())
                .to_string()
                .contains("connection refused")
        );
        assert_eq!(
            Error::Api {
                code: 400,
                description: "Bad Request: message is not modified".into()
            }
            .to_string(),
            "Telegram API error 400: Bad Request: message is not modified"
        );
    }

    #[test]
    fn error_debug_includes_variant_name() {
        let err = Error::TransportConnect("test error".into());
        let debug = format!("{err:?}");
        assert!(
            debug.contains("TransportConnect"),
            "Debug output must include variant name, got: {debug}"
        );
    }
}
