//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Secrets (bot token, Gemini keys) come from TELEGRAM_BOT_TOKEN /
//! GEMINI_API_KEYS or from files named in the TOML, never from the TOML itself.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use common::{Secret, parse_secret_list};
use key_pool::{Placeholders, PromptTemplate};
use serde::Deserialize;
use tracing::warn;

/// Root configuration. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub gemini: GeminiConfig,
    pub admin: AdminConfig,
    pub content: ContentConfig,
    pub placeholders: PlaceholderConfig,
}

/// Bot API connection settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_base_url: String,
    pub poll_timeout_secs: u64,
    /// Skip updates that queued up while the bot was offline
    pub drop_pending_updates: bool,
    /// Path to a file containing the bot token (alternative to TELEGRAM_BOT_TOKEN)
    pub token_file: Option<PathBuf>,
    #[serde(skip)]
    pub token: Option<Secret<String>>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base_url: crate::telegram::DEFAULT_API_BASE_URL.to_string(),
            poll_timeout_secs: 30,
            drop_pending_updates: true,
            token_file: None,
            token: None,
        }
    }
}

/// Generative backend settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Zero-based key to start from; CURRENT_API_INDEX overrides it
    pub start_index: usize,
    /// File holding comma- or newline-separated keys (alternative to GEMINI_API_KEYS)
    pub api_keys_file: Option<PathBuf>,
    pub response_language: String,
    pub assistant_role: String,
    #[serde(skip)]
    pub api_keys: Vec<Secret<String>>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        let template = PromptTemplate::default();
        Self {
            api_base_url: provider::gemini::DEFAULT_BASE_URL.to_string(),
            model: provider::gemini::DEFAULT_MODEL.to_string(),
            timeout_secs: 60,
            start_index: 0,
            api_keys_file: None,
            response_language: template.response_language,
            assistant_role: template.assistant_role,
            api_keys: Vec::new(),
        }
    }
}

impl GeminiConfig {
    pub fn prompt_template(&self) -> PromptTemplate {
        PromptTemplate {
            assistant_role: self.assistant_role.clone(),
            response_language: self.response_language.clone(),
        }
    }
}

/// Health and metrics listener
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9090)),
            max_connections: 1000,
        }
    }
}

/// Static menu texts. `welcome` may contain `{name}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub welcome: String,
    pub main_menu: String,
    pub academy_info: String,
    pub programs: String,
    pub paths: String,
    pub pricing: String,
    pub contact: String,
    pub ai_intro: String,
    pub searching: String,
    pub fallback: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            welcome: "🌟 Welcome {name} to the academy! 🌟\n\n\
                      📚 We teach Quran recitation and memorization for all ages.\n\n\
                      🤖 I can tell you about our programs, subscription plans and \
                      registration, or answer your questions.\n\n\
                      Choose from the menu below:"
                .to_string(),
            main_menu: "🏠 Main menu:\nChoose what you would like to know:".to_string(),
            academy_info: "📚 About the academy\n\n\
                           Online Quran memorization and recitation classes with \
                           certified teachers, for children and adults."
                .to_string(),
            programs: "💠 Programs\n\n\
                       1️⃣ Group memorization\n\
                       2️⃣ Intensive memorization\n\
                       3️⃣ Individual memorization\n\
                       4️⃣ Memorization and review"
                .to_string(),
            paths: "🧭 Learning paths\n\n\
                    1️⃣ Reading and writing\n\
                    2️⃣ New memorization\n\
                    3️⃣ Consolidation (recitation)\n\
                    4️⃣ Ijazah"
                .to_string(),
            pricing: "💵 Subscription plans\n\n\
                      Monthly group and individual plans are available. \
                      Contact us for current prices."
                .to_string(),
            contact: "📞 Contact and registration\n\n\
                      Message us here on Telegram to register or ask about a plan."
                .to_string(),
            ai_intro: "🤖 Hello! I am the academy's AI assistant.\n\n\
                       Ask me anything about the academy:\n\
                       • Programs and paths\n\
                       • Prices and subscriptions\n\
                       • How to register\n\n\
                       Type your question and I will answer right away! 💬"
                .to_string(),
            searching: "🤖 Looking for an answer...".to_string(),
            fallback: "Hello! 👋\n\nTo use the bot, send /start or choose from the menu below:"
                .to_string(),
        }
    }
}

impl ContentConfig {
    pub fn welcome_for(&self, name: &str) -> String {
        self.welcome.replace("{name}", name)
    }

    /// Context handed to the completion client with every question.
    pub fn ai_context(&self) -> String {
        format!("{}\n{}\n{}", self.academy_info, self.pricing, self.contact)
    }
}

/// Texts returned instead of a generated answer.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlaceholderConfig {
    pub unavailable: String,
    pub generic_error: String,
    pub rephrase: String,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        let defaults = Placeholders::default();
        Self {
            unavailable: defaults.unavailable,
            generic_error: defaults.generic_error,
            rephrase: defaults.rephrase,
        }
    }
}

impl From<PlaceholderConfig> for Placeholders {
    fn from(config: PlaceholderConfig) -> Self {
        Placeholders {
            unavailable: config.unavailable,
            generic_error: config.generic_error,
            rephrase: config.rephrase,
        }
    }
}

fn require_http_url(field: &str, url: &str) -> common::Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {url}"
        )))
    }
}

fn require_non_zero(field: &str, value: u64) -> common::Result<()> {
    if value == 0 {
        return Err(common::Error::Config(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

fn read_secret_file(field: &str, path: &Path) -> common::Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        common::Error::Config(format!("failed to read {field} {}: {e}", path.display()))
    })
}

/// Non-empty, trimmed value of an env var.
fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate TOML, then resolve secrets.
    ///
    /// Bot token resolution order:
    /// 1. TELEGRAM_BOT_TOKEN env var
    /// 2. token_file path from config
    ///
    /// Gemini keys resolution order:
    /// 1. GEMINI_API_KEYS env var
    /// 2. api_keys_file path from config (an unreadable file leaves the pool empty)
    ///
    /// A malformed CURRENT_API_INDEX is logged and ignored.
    pub fn from_toml(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;
        config.validate()?;

        if let Some(token) = env_value("TELEGRAM_BOT_TOKEN") {
            config.telegram.token = Some(Secret::new(token));
        } else if let Some(ref token_file) = config.telegram.token_file {
            let token = read_secret_file("token_file", token_file)?;
            let token = token.trim().to_owned();
            if !token.is_empty() {
                config.telegram.token = Some(Secret::new(token));
            }
        }

        if let Ok(keys) = std::env::var("GEMINI_API_KEYS") {
            config.gemini.api_keys = parse_secret_list(&keys);
        } else if let Some(ref keys_file) = config.gemini.api_keys_file {
            // Unreadable keys only disable AI answers
            match read_secret_file("api_keys_file", keys_file) {
                Ok(keys) => {
                    config.gemini.api_keys = parse_secret_list(&keys.replace('\n', ","));
                }
                Err(e) => warn!(error = %e, "ignoring api_keys_file, AI answers disabled"),
            }
        }

        if let Some(raw) = env_value("CURRENT_API_INDEX") {
            match raw.parse::<usize>() {
                Ok(index) => config.gemini.start_index = index,
                Err(e) => warn!(
                    value = %raw,
                    error = %e,
                    "ignoring malformed CURRENT_API_INDEX"
                ),
            }
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        require_http_url("telegram.api_base_url", &self.telegram.api_base_url)?;
        require_http_url("gemini.api_base_url", &self.gemini.api_base_url)?;
        require_non_zero("telegram.poll_timeout_secs", self.telegram.poll_timeout_secs)?;
        require_non_zero("gemini.timeout_secs", self.gemini.timeout_secs)?;
        require_non_zero("admin.max_connections", self.admin.max_connections as u64)?;
        if self.gemini.model.trim().is_empty() {
            return Err(common::Error::Config("gemini.model must not be empty".into()));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("academy-bot.toml")
    }
}
