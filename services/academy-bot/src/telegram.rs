//! Telegram Bot API client over plain HTTPS long polling
//!
//! Covers only the methods the bot uses: `getMe`, `getUpdates`, `sendMessage`,
//! `editMessageText` and `answerCallbackQuery`. Every call is a JSON POST to
//! `{base_url}/bot{token}/{method}` and every reply is the standard envelope
//! `{"ok": bool, "result": ..., "error_code": ..., "description": ...}`.
//!
//! The token is part of the URL, so transport errors are stripped of their URL
//! before they are logged or returned.

use std::time::Duration;

use common::Secret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{Error, Result};

/// Default public Bot API endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

/// Maximum length of a single message text, in UTF-16 code units.
pub const MAX_MESSAGE_UNITS: usize = 4096;

/// Timeout for calls other than `getUpdates`.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra headroom on top of the long-poll timeout before the HTTP call gives up.
const POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

/// One incoming update. Kinds other than messages and callback queries are
/// left as `None` on both fields and ignored by the dispatcher.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// The bot's own account, as reported by `getMe`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboardButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Serialize)]
struct GetUpdates<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboardMarkup>,
}

#[derive(Serialize)]
struct EditMessageText<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboardMarkup>,
}

#[derive(Serialize)]
struct AnswerCallbackQuery<'a> {
    callback_query_id: &'a str,
}

/// Thin Bot API client. Cheap to clone (shares the reqwest pool).
#[derive(Clone)]
pub struct TelegramApi {
    client: reqwest::Client,
    base_url: String,
    token: Secret<String>,
    poll_timeout: Duration,
}

impl TelegramApi {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        token: Secret<String>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token,
            poll_timeout,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.base_url.trim_end_matches('/'),
            self.token.expose()
        )
    }

    async fn call<P, R>(&self, method: &str, params: &P, timeout: Duration) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(params)
            .send()
            .await
            .map_err(|e| Error::TransportConnect(e.without_url().to_string()))?;

        let status = response.status();
        let envelope = response.json::<Envelope<R>>().await.map_err(|e| {
            Error::TransportConnect(format!(
                "{method}: unreadable response ({status}): {}",
                e.without_url()
            ))
        })?;

        if envelope.ok {
            return envelope.result.ok_or_else(|| {
                Error::TransportConnect(format!("{method}: ok response without result"))
            });
        }

        let code = envelope.error_code.unwrap_or(i64::from(status.as_u16()));
        // A malformed token yields 404 rather than 401
        if code == 401 || (code == 404 && method == "getMe") {
            return Err(Error::TransportAuth);
        }
        Err(Error::Api {
            code,
            description: envelope
                .description
                .unwrap_or_else(|| String::from("<no description>")),
        })
    }

    /// Verify the token and fetch the bot's identity.
    pub async fn get_me(&self) -> Result<BotIdentity> {
        self.call("getMe", &serde_json::json!({}), REQUEST_TIMEOUT)
            .await
    }

    /// Long-poll for updates with id >= `offset`.
    #[instrument(skip(self))]
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let params = GetUpdates {
            offset,
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: &["message", "callback_query"],
        };
        let updates: Vec<Update> = self
            .call("getUpdates", &params, self.poll_timeout + POLL_GRACE)
            .await?;
        if !updates.is_empty() {
            debug!(count = updates.len(), "received updates");
        }
        Ok(updates)
    }

    /// Acknowledge everything queued while the bot was offline.
    ///
    /// Returns the offset to poll from next.
    pub async fn skip_pending_updates(&self) -> Result<i64> {
        let params = GetUpdates {
            offset: -1,
            timeout: 0,
            allowed_updates: &["message", "callback_query"],
        };
        let updates: Vec<Update> = self.call("getUpdates", &params, REQUEST_TIMEOUT).await?;
        Ok(updates.last().map_or(0, |u| u.update_id + 1))
    }

    /// Send `text`, split into Telegram-sized chunks. The keyboard goes on the
    /// last chunk only.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<()> {
        let chunks = split_message(text, MAX_MESSAGE_UNITS);
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.iter().enumerate() {
            let params = SendMessage {
                chat_id,
                text: chunk,
                reply_markup: if i == last { reply_markup } else { None },
            };
            let _: Message = self.call("sendMessage", &params, REQUEST_TIMEOUT).await?;
        }
        Ok(())
    }

    /// Replace the text (and keyboard) of a message the bot sent earlier.
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<()> {
        let params = EditMessageText {
            chat_id,
            message_id,
            text,
            reply_markup,
        };
        // Result is the edited Message, or `true` for inline messages
        let _: serde_json::Value = self
            .call("editMessageText", &params, REQUEST_TIMEOUT)
            .await?;
        Ok(())
    }

    /// Stop the client-side loading spinner on a pressed button.
    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<()> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &AnswerCallbackQuery { callback_query_id },
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(())
    }
}

/// Split `text` into pieces of at most `max_units` UTF-16 code units (what
/// Telegram counts), preferring to break after a newline. Always returns at
/// least one piece.
pub fn split_message(text: &str, max_units: usize) -> Vec<String> {
    // A surrogate pair must always fit
    let max_units = max_units.max(2);

    let mut chunks = Vec::new();
    let mut rest = text;
    loop {
        let hard_end = utf16_prefix_end(rest, max_units);
        if hard_end == rest.len() {
            break;
        }
        let end = match rest[..hard_end].rfind('\n') {
            Some(nl) if nl > 0 => nl + 1,
            _ => hard_end,
        };
        chunks.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// Byte offset just past the longest prefix of `text` that fits in
/// `max_units` UTF-16 code units.
fn utf16_prefix_end(text: &str, max_units: usize) -> usize {
    let mut units = 0;
    for (i, c) in text.char_indices() {
        units += c.len_utf16();
        if units > max_units {
            return i;
        }
    }
    text.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::http::StatusCode;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    type Calls = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

    /// Mock Bot API: records (method, body) and answers with `reply(method)`.
    async fn start_mock_api(
        reply: fn(&str) -> (StatusCode, serde_json::Value),
    ) -> (String, Calls, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();

        let handle = tokio::spawn(async move {
            let app = axum::Router::new().fallback(
                move |uri: axum::http::Uri, Json(body): Json<serde_json::Value>| {
                    let sink = sink.clone();
                    async move {
                        let method = uri.path().rsplit('/').next().unwrap_or("").to_string();
                        sink.lock().unwrap().push((method.clone(), body));
                        let (status, json) = reply(&method);
                        (status, Json(json))
                    }
                },
            );
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), calls, handle)
    }

    fn ok_replies(method: &str) -> (StatusCode, serde_json::Value) {
        let result = match method {
            "getMe" => serde_json::json!({"id": 7, "is_bot": true, "first_name": "Academy", "username": "academy_bot"}),
            "getUpdates" => serde_json::json!([
                {"update_id": 100, "message": {"message_id": 1, "chat": {"id": 42}, "from": {"id": 9, "first_name": "Amina"}, "text": "/start"}},
                {"update_id": 101, "callback_query": {"id": "cb-1", "from": {"id": 9, "first_name": "Amina"}, "data": "pricing",
                    "message": {"message_id": 2, "chat": {"id": 42}}}},
                {"update_id": 102, "edited_message": {"message_id": 3, "chat": {"id": 42}}}
            ]),
            "sendMessage" | "editMessageText" => serde_json::json!({"message_id": 5, "chat": {"id": 42}}),
            "answerCallbackQuery" => serde_json::json!(true),
            _ => serde_json::json!(null),
        };
        (StatusCode::OK, serde_json::json!({"ok": true, "result": result}))
    }

    fn unauthorized(_method: &str) -> (StatusCode, serde_json::Value) {
        (
            StatusCode::UNAUTHORIZED,
            serde_json::json!({"ok": false, "error_code": 401, "description": "Unauthorized"}),
        )
    }

    fn bad_request(_method: &str) -> (StatusCode, serde_json::Value) {
        (
            StatusCode::BAD_REQUEST,
            serde_json::json!({"ok": false, "error_code": 400, "description": "Bad Request: message is not modified"}),
        )
    }

    fn api(base_url: &str) -> TelegramApi {
        TelegramApi::new(
            reqwest::Client::new(),
            base_url,
            Secret::from("123:secret-token"),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn method_url_embeds_token_and_method() {
        let api = api("https://api.telegram.org/");
        assert_eq!(
            api.method_url("getMe"),
            "https://api.telegram.org/bot123:secret-token/getMe"
        );
    }

    #[tokio::test]
    async fn get_me_returns_identity() {
        let (url, calls, _server) = start_mock_api(ok_replies).await;
        let me = api(&url).get_me().await.unwrap();
        assert_eq!(me.id, 7);
        assert_eq!(me.username.as_deref(), Some("academy_bot"));
        assert_eq!(calls.lock().unwrap()[0].0, "getMe");
    }

    #[tokio::test]
    async fn get_me_unauthorized_is_transport_auth() {
        let (url, _calls, _server) = start_mock_api(unauthorized).await;
        let err = api(&url).get_me().await.unwrap_err();
        assert!(matches!(err, Error::TransportAuth), "got: {err:?}");
    }

    #[tokio::test]
    async fn get_updates_parses_messages_and_callbacks() {
        let (url, calls, _server) = start_mock_api(ok_replies).await;
        let updates = api(&url).get_updates(100).await.unwrap();

        assert_eq!(updates.len(), 3);
        assert_eq!(
            updates[0].message.as_ref().unwrap().text.as_deref(),
            Some("/start")
        );
        let callback = updates[1].callback_query.as_ref().unwrap();
        assert_eq!(callback.data.as_deref(), Some("pricing"));
        assert_eq!(callback.from.id, 9);
        assert!(updates[2].message.is_none() && updates[2].callback_query.is_none());

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].1["offset"], 100);
        assert_eq!(calls[0].1["timeout"], 1);
    }

    #[tokio::test]
    async fn skip_pending_updates_returns_offset_past_last() {
        let (url, calls, _server) = start_mock_api(ok_replies).await;
        let next = api(&url).skip_pending_updates().await.unwrap();
        assert_eq!(next, 103);

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].1["offset"], -1);
        assert_eq!(calls[0].1["timeout"], 0);
    }

    #[tokio::test]
    async fn send_message_attaches_keyboard() {
        let (url, calls, _server) = start_mock_api(ok_replies).await;
        let keyboard = InlineKeyboardMarkup {
            inline_keyboard: vec![vec![InlineKeyboardButton::new("Back", "main_menu")]],
        };
        api(&url)
            .send_message(42, "hello", Some(&keyboard))
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (method, body) = &calls[0];
        assert_eq!(method, "sendMessage");
        assert_eq!(body["chat_id"], 42);
        assert_eq!(body["text"], "hello");
        assert_eq!(
            body["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "main_menu"
        );
    }

    #[tokio::test]
    async fn send_message_without_keyboard_omits_markup() {
        let (url, calls, _server) = start_mock_api(ok_replies).await;
        api(&url).send_message(42, "plain", None).await.unwrap();
        let calls = calls.lock().unwrap();
        assert!(calls[0].1.get("reply_markup").is_none());
    }

    #[tokio::test]
    async fn long_message_is_split_with_keyboard_on_last_chunk() {
        let (url, calls, _server) = start_mock_api(ok_replies).await;
        let keyboard = InlineKeyboardMarkup {
            inline_keyboard: vec![vec![InlineKeyboardButton::new("Back", "main_menu")]],
        };
        let text = "x".repeat(MAX_MESSAGE_UNITS + 10);
        api(&url)
            .send_message(42, &text, Some(&keyboard))
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].1.get("reply_markup").is_none());
        assert!(calls[1].1.get("reply_markup").is_some());
    }

    #[tokio::test]
    async fn api_error_carries_code_and_description() {
        let (url, _calls, _server) = start_mock_api(bad_request).await;
        let err = api(&url)
            .edit_message_text(42, 5, "same", None)
            .await
            .unwrap_err();
        match err {
            Error::Api { code, description } => {
                assert_eq!(code, 400);
                assert!(description.contains("not modified"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn answer_callback_query_sends_id() {
        let (url, calls, _server) = start_mock_api(ok_replies).await;
        api(&url).answer_callback_query("cb-1").await.unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].0, "answerCallbackQuery");
        assert_eq!(calls[0].1["callback_query_id"], "cb-1");
    }

    #[tokio::test]
    async fn transport_error_does_not_leak_token() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = api(&format!("http://{addr}")).get_me().await.unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, Error::TransportConnect(_)));
        assert!(!msg.contains("secret-token"), "token leaked: {msg}");
    }

    #[test]
    fn split_message_short_text_is_single_chunk() {
        assert_eq!(split_message("hi", 10), vec!["hi"]);
        assert_eq!(split_message("", 10), vec![""]);
    }

    #[test]
    fn split_message_prefers_newline_boundaries() {
        let chunks = split_message("aaaa\nbbbb\ncc", 6);
        assert_eq!(chunks, vec!["aaaa\n", "bbbb\n", "cc"]);
    }

    #[test]
    fn split_message_hard_splits_long_lines_on_char_boundaries() {
        let text = "ششششششش"; // 7 two-byte characters
        let chunks = split_message(text, 3);
        assert_eq!(chunks, vec!["ششش", "ششش", "ش"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn split_message_fits_short_text_exactly_at_limit() {
        assert_eq!(split_message("abcdef", 6), vec!["abcdef"]);
    }

    #[test]
    fn split_message_counts_emoji_as_two_units() {
        let text = "😀".repeat(MAX_MESSAGE_UNITS);
        let chunks = split_message(&text, MAX_MESSAGE_UNITS);

        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert!(chunk.encode_utf16().count() <= MAX_MESSAGE_UNITS);
        }
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn split_message_never_cuts_a_surrogate_pair() {
        let chunks = split_message("a😀b😀", 2);
        assert_eq!(chunks, vec!["a", "😀", "b", "😀"]);
    }
}
