//! Configuration model, runtime paths and chat-list editing helpers.
//!
//! Everything lives under `~/.fancifier/`:
//! - `config.toml`: chats, plugin orders, LLM prompts (hot-reloaded)
//! - `.env`: Telegram token and provider keys
//! - `logs/`: rotated JSON logs
//! - `plugins/`: external plugin manifests
//!
//! `FANCIFIER_CONFIG_PATH` points the daemon at a different config file.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::providers::ApiStyle;
use crate::safeguard::DEFAULT_MAX_AGE_SECS;
use crate::transport::FormatHint;

pub mod store;
pub mod watcher;

pub use store::ConfigStore;
pub use watcher::ConfigWatcher;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "FANCIFIER_CONFIG_PATH";

/// Name of the prompt used when nothing else resolves.
pub const DEFAULT_PROMPT_NAME: &str = "emoji_mirror";

const DEFAULT_SYSTEM_PROMPT: &str = "Say nothing yourself. Just mirror user phrases. \
Add lots of appropriate emoji throughout the message to the user message and send it back. \
Do not add your own words (this is important)";

const DEFAULT_USER_PROMPT: &str = "Add lots of appropriate emoji throughout (not just at the end, \
but at the middle of the text) to the following message and just send back the message. \
Do not add your words. The message is: {text}";

// ── Chats ───────────────────────────────────────────────────────

/// Plugin chain for one chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Platform chat identifier.
    pub chat_id: i64,
    /// Display name, informational only.
    #[serde(default)]
    pub title: String,
    /// Plugin ids applied in order. May repeat; empty disables the chat.
    #[serde(default)]
    pub plugin_order: Vec<String>,
}

// ── LLM ─────────────────────────────────────────────────────────

/// One named prompt for the `llm_rewrite` plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmPromptConfig {
    /// System prompt.
    pub system_prompt: String,
    /// User prompt; `{text}` marks where the message goes.
    pub user_prompt_template: String,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f64,
}

impl Default for LlmPromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            user_prompt_template: DEFAULT_USER_PROMPT.to_owned(),
            temperature: 0.0,
        }
    }
}

/// Provider settings for the `llm_rewrite` plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model identifier sent to the provider.
    pub model: String,
    /// Endpoint dialect.
    pub api_style: ApiStyle,
    /// Name of the prompt in `prompts` to use.
    pub active_prompt: String,
    /// Named prompts.
    pub prompts: BTreeMap<String, LlmPromptConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut prompts = BTreeMap::new();
        prompts.insert(DEFAULT_PROMPT_NAME.to_owned(), LlmPromptConfig::default());
        Self {
            model: crate::providers::deepseek::DEFAULT_MODEL.to_owned(),
            api_style: ApiStyle::default(),
            active_prompt: DEFAULT_PROMPT_NAME.to_owned(),
            prompts,
        }
    }
}

impl LlmConfig {
    /// Resolve the prompt to use. Never fails.
    ///
    /// Order: `prompts[active_prompt]`, then `prompts["emoji_mirror"]`, then
    /// the built-in default prompt.
    pub fn active_prompt(&self) -> LlmPromptConfig {
        self.prompts
            .get(&self.active_prompt)
            .or_else(|| self.prompts.get(DEFAULT_PROMPT_NAME))
            .cloned()
            .unwrap_or_default()
    }
}

// ── App ─────────────────────────────────────────────────────────

/// One immutable configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// File format version.
    pub schema_version: u32,
    /// Rendering mode for edits: `markdown_v2`, `html` or `plain`.
    pub parse_mode: String,
    /// Log would-be edits instead of sending them.
    pub default_dry_run: bool,
    /// Edits are refused for messages older than this.
    pub max_message_age_secs: u64,
    /// Config file polling interval for hot reload.
    pub watch_interval_ms: u64,
    /// Directory of external plugin manifests. Defaults to `~/.fancifier/plugins`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins_dir: Option<PathBuf>,
    /// `llm_rewrite` settings.
    pub llm: LlmConfig,
    /// Configured chats, unique by `chat_id`.
    pub chats: Vec<ChatConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            parse_mode: "markdown_v2".to_owned(),
            default_dry_run: false,
            max_message_age_secs: DEFAULT_MAX_AGE_SECS,
            watch_interval_ms: 1000,
            plugins_dir: None,
            llm: LlmConfig::default(),
            chats: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Plugin order for a chat; empty when the chat is not configured.
    pub fn plugin_order(&self, chat_id: i64) -> &[String] {
        self.chats
            .iter()
            .find(|chat| chat.chat_id == chat_id)
            .map(|chat| chat.plugin_order.as_slice())
            .unwrap_or(&[])
    }

    /// Rendering hint derived from `parse_mode`.
    pub fn format_hint(&self) -> FormatHint {
        FormatHint::from_parse_mode(&self.parse_mode)
    }

    /// Check invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error when two chats share a `chat_id`.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for chat in &self.chats {
            if !seen.insert(chat.chat_id) {
                anyhow::bail!("chat_id {} is configured more than once", chat.chat_id);
            }
        }
        Ok(())
    }

    /// Parse a TOML string into a validated config.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML or failed validation.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("failed to parse config TOML: {e}"))?;
        config.validate()?;
        Ok(config)
    }
}

// ── Chat list editing ───────────────────────────────────────────

/// Apply updated chat entries, keeping the order and untouched chats.
///
/// Updates for known chat ids replace the entry in place; unknown ones are
/// appended in update order.
pub fn merge_chat_configs(existing: &[ChatConfig], updates: &[ChatConfig]) -> Vec<ChatConfig> {
    let mut merged: Vec<ChatConfig> = existing
        .iter()
        .map(|chat| {
            updates
                .iter()
                .rev()
                .find(|update| update.chat_id == chat.chat_id)
                .unwrap_or(chat)
                .clone()
        })
        .collect();

    for update in updates {
        if !merged.iter().any(|chat| chat.chat_id == update.chat_id) {
            merged.push(update.clone());
        }
    }
    merged
}

/// Drop the chats whose ids are listed, keeping the rest in order.
pub fn remove_chat_configs(existing: &[ChatConfig], chat_ids: &[i64]) -> Vec<ChatConfig> {
    existing
        .iter()
        .filter(|chat| !chat_ids.contains(&chat.chat_id))
        .cloned()
        .collect()
}

// ── Paths ───────────────────────────────────────────────────────

/// Resolved filesystem locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    /// Runtime root (`~/.fancifier`).
    pub root: PathBuf,
    /// Config file watched for hot reload.
    pub config_file: PathBuf,
    /// Log directory.
    pub logs_dir: PathBuf,
    /// Default external plugin directory.
    pub plugins_dir: PathBuf,
    /// Credentials file.
    pub env_file: PathBuf,
}

impl RuntimePaths {
    /// Lay out paths under `root`, optionally overriding the config file.
    pub fn under(root: &Path, config_override: Option<PathBuf>) -> Self {
        Self {
            root: root.to_path_buf(),
            config_file: config_override.unwrap_or_else(|| root.join("config.toml")),
            logs_dir: root.join("logs"),
            plugins_dir: root.join("plugins"),
            env_file: root.join(".env"),
        }
    }
}

/// Resolve the default runtime root (`~/.fancifier/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".fancifier"))
}

/// Resolve runtime paths, honouring `FANCIFIER_CONFIG_PATH`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn runtime_paths() -> anyhow::Result<RuntimePaths> {
    runtime_paths_with(|key| std::env::var(key).ok())
}

/// Resolve runtime paths using a custom env resolver (for testing).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn runtime_paths_with(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<RuntimePaths> {
    let root = config_dir()?;
    let config_override = env(CONFIG_PATH_ENV)
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from);
    Ok(RuntimePaths::under(&root, config_override))
}
