//! Update dispatcher and long-polling loop
//!
//! `/start` and menu callbacks answer from static content. Free text goes to
//! the completion client only while the sender is in AI-chat mode; everyone
//! else gets the fallback prompt and the main menu.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use key_pool::CompletionClient;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::ContentConfig;
use crate::error::{Error, Result};
use crate::metrics;
use crate::service::ServiceMetrics;
use crate::session::SessionStore;
use crate::telegram::{
    CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message, TelegramApi, Update,
};

/// Longest pause between failed `getUpdates` calls.
const MAX_POLL_BACKOFF: Duration = Duration::from_secs(30);

/// Menu buttons and their callback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    MainMenu,
    AcademyInfo,
    Programs,
    Paths,
    Pricing,
    Contact,
    AskAi,
}

impl MenuAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "main_menu" => Some(Self::MainMenu),
            "academy_info" => Some(Self::AcademyInfo),
            "programs" => Some(Self::Programs),
            "paths" => Some(Self::Paths),
            "pricing" => Some(Self::Pricing),
            "contact" => Some(Self::Contact),
            "ask_ai" => Some(Self::AskAi),
            _ => None,
        }
    }

    pub fn callback_data(self) -> &'static str {
        match self {
            Self::MainMenu => "main_menu",
            Self::AcademyInfo => "academy_info",
            Self::Programs => "programs",
            Self::Paths => "paths",
            Self::Pricing => "pricing",
            Self::Contact => "contact",
            Self::AskAi => "ask_ai",
        }
    }

    fn button(self, label: &str) -> InlineKeyboardButton {
        InlineKeyboardButton::new(label, self.callback_data())
    }
}

/// Three rows of two buttons.
pub fn main_menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![
                MenuAction::AcademyInfo.button("📚 About the academy"),
                MenuAction::Programs.button("💠 Programs"),
            ],
            vec![
                MenuAction::Paths.button("🧭 Learning paths"),
                MenuAction::Pricing.button("💵 Subscriptions"),
            ],
            vec![
                MenuAction::Contact.button("📞 Contact & registration"),
                MenuAction::AskAi.button("❓ Ask the AI"),
            ],
        ],
    }
}

pub fn back_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![vec![MenuAction::MainMenu.button("🔙 Back to main menu")]],
    }
}

/// `/start`, `/start@bot_name` and `/start payload` all count.
fn is_start_command(text: &str) -> bool {
    let command = text.split_whitespace().next().unwrap_or("");
    command == "/start" || command.starts_with("/start@")
}

/// Exponential pause after `failures` consecutive polling errors.
fn poll_backoff(failures: u32) -> Duration {
    let secs = 2u64.saturating_pow(failures.saturating_sub(1));
    Duration::from_secs(secs).min(MAX_POLL_BACKOFF)
}

pub struct Bot {
    api: TelegramApi,
    completions: Arc<CompletionClient>,
    sessions: SessionStore,
    content: ContentConfig,
    ai_context: String,
    metrics: ServiceMetrics,
}

impl Bot {
    pub fn new(
        api: TelegramApi,
        completions: Arc<CompletionClient>,
        content: ContentConfig,
        metrics: ServiceMetrics,
    ) -> Self {
        let ai_context = content.ai_context();
        Self {
            api,
            completions,
            sessions: SessionStore::new(),
            content,
            ai_context,
            metrics,
        }
    }

    fn transport_failed(&self, method: &'static str, err: &Error) {
        self.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
        metrics::record_telegram_error(method);
        warn!(method, error = %err, "Telegram call failed");
    }

    /// Route one update to its handler.
    pub async fn handle_update(&self, update: Update) -> Result<()> {
        if let Some(message) = update.message {
            self.handle_message(message).await
        } else if let Some(query) = update.callback_query {
            self.handle_callback(query).await
        } else {
            metrics::record_update("ignored");
            debug!(update_id = update.update_id, "ignoring unsupported update");
            Ok(())
        }
    }

    async fn handle_message(&self, message: Message) -> Result<()> {
        let chat_id = message.chat.id;
        let Some(text) = message.text.as_deref() else {
            metrics::record_update("ignored");
            return Ok(());
        };
        let user_id = message.from.as_ref().map_or(chat_id, |u| u.id);

        if is_start_command(text) {
            metrics::record_update("start");
            let name = message
                .from
                .as_ref()
                .map(|u| u.first_name.as_str())
                .unwrap_or_default();
            return self
                .api
                .send_message(
                    chat_id,
                    &self.content.welcome_for(name),
                    Some(&main_menu_keyboard()),
                )
                .await
                .inspect_err(|e| self.transport_failed("sendMessage", e));
        }

        if text.starts_with('/') {
            metrics::record_update("ignored");
            debug!(user_id, "ignoring unknown command");
            return Ok(());
        }

        if self.sessions.is_ai_chat(user_id).await {
            metrics::record_update("ai_question");
            return self.answer_question(chat_id, user_id, text).await;
        }

        metrics::record_update("text");
        self.api
            .send_message(chat_id, &self.content.fallback, Some(&main_menu_keyboard()))
            .await
            .inspect_err(|e| self.transport_failed("sendMessage", e))
    }

    async fn answer_question(&self, chat_id: i64, user_id: i64, question: &str) -> Result<()> {
        let request_id = format!("q_{}", uuid::Uuid::new_v4().as_simple());
        let span = info_span!("ai_question", %request_id, user_id);

        async {
            // The answer is still worth sending if the notice fails
            if let Err(e) = self
                .api
                .send_message(chat_id, &self.content.searching, None)
                .await
            {
                self.transport_failed("sendMessage", &e);
            }

            let started = Instant::now();
            let answer = self
                .completions
                .generate_response(question, &self.ai_context)
                .await;
            let elapsed = started.elapsed();
            metrics::record_completion_duration(elapsed.as_secs_f64());
            info!(elapsed_ms = elapsed.as_millis() as u64, "answer ready");

            self.api
                .send_message(chat_id, &answer, Some(&back_keyboard()))
                .await
                .inspect_err(|e| self.transport_failed("sendMessage", e))
        }
        .instrument(span)
        .await
    }

    async fn handle_callback(&self, query: CallbackQuery) -> Result<()> {
        metrics::record_update("callback");
        if let Err(e) = self.api.answer_callback_query(&query.id).await {
            self.transport_failed("answerCallbackQuery", &e);
        }

        let user_id = query.from.id;
        let Some(action) = query.data.as_deref().and_then(MenuAction::parse) else {
            debug!(user_id, data = ?query.data, "ignoring unknown callback");
            return Ok(());
        };

        let (text, keyboard) = match action {
            MenuAction::MainMenu => {
                if self.sessions.clear(user_id).await {
                    debug!(user_id, "left AI chat");
                }
                (self.content.main_menu.as_str(), main_menu_keyboard())
            }
            MenuAction::AcademyInfo => (self.content.academy_info.as_str(), back_keyboard()),
            MenuAction::Programs => (self.content.programs.as_str(), back_keyboard()),
            MenuAction::Paths => (self.content.paths.as_str(), back_keyboard()),
            MenuAction::Pricing => (self.content.pricing.as_str(), back_keyboard()),
            MenuAction::Contact => (self.content.contact.as_str(), back_keyboard()),
            MenuAction::AskAi => {
                self.sessions.enter_ai_chat(user_id).await;
                debug!(user_id, "entered AI chat");
                (self.content.ai_intro.as_str(), back_keyboard())
            }
        };

        // Buttons on messages too old for Telegram to include have nothing to edit
        let Some(message) = query.message else {
            return Ok(());
        };
        self.api
            .edit_message_text(message.chat.id, message.message_id, text, Some(&keyboard))
            .await
            .inspect_err(|e| self.transport_failed("editMessageText", e))
    }
}

/// Poll for updates until `shutdown` flips to true, handling each update on its
/// own task, then wait for the tasks still running.
///
/// Returns early only if Telegram rejects the token.
pub async fn run_polling(bot: Arc<Bot>, mut shutdown: watch::Receiver<bool>, drop_pending: bool) {
    let mut offset = 0;
    if drop_pending {
        match bot.api.skip_pending_updates().await {
            Ok(next) => {
                offset = next;
                info!(offset, "skipped pending updates");
            }
            Err(e) => bot.transport_failed("getUpdates", &e),
        }
    }

    let mut tasks = JoinSet::new();
    let mut failures: u32 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let polled = tokio::select! {
            polled = bot.api.get_updates(offset) => polled,
            _ = shutdown.changed() => break,
        };

        match polled {
            Ok(updates) => {
                failures = 0;
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    bot.metrics.updates_total.fetch_add(1, Ordering::Relaxed);
                    let in_flight = bot.metrics.track_in_flight();

                    let bot = bot.clone();
                    let update_id = update.update_id;
                    tasks.spawn(async move {
                        let _in_flight = in_flight;
                        if let Err(e) = bot.handle_update(update).await {
                            debug!(update_id, error = %e, "update handling failed");
                        }
                    });
                }
            }
            Err(Error::TransportAuth) => {
                error!("Telegram rejected the bot token, polling stopped");
                break;
            }
            Err(e) => {
                failures += 1;
                bot.transport_failed("getUpdates", &e);
                let delay = poll_backoff(failures);
                warn!(
                    failures,
                    retry_in_secs = delay.as_secs(),
                    "polling failed, backing off"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }

        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "update task panicked");
            }
        }
    }

    let pending = tasks.len();
    if pending > 0 {
        info!(pending, "waiting for in-flight updates");
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "update task panicked");
        }
    }
}
