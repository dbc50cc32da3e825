// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Ferry bridge.
//!
//! All sections use `#[serde(deny_unknown_fields)]` so typos in config
//! files are rejected at startup instead of silently ignored.

use ferry_core::{FerryError, SessionPolicy};
use serde::{Deserialize, Serialize};

/// Top-level Ferry configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with `FERRY_*`
/// environment variable overrides. All sections default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FerryConfig {
    #[serde(default)]
    pub agent: AgentConfig,

    /// Chat platform credentials and event intake.
    #[serde(default)]
    pub chat: ChatConfig,

    /// AI backend sub-process settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Relevance classifier settings. Absence of an API key disables the
    /// classifier: buffered group messages are digested unconditionally.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Session store and freshness settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// History truncation settings for prompt assembly.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Digest scheduler settings.
    #[serde(default)]
    pub digest: DigestConfig,

    /// Tool-surface HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl FerryConfig {
    /// Startup validation: missing required fields are fatal.
    pub fn validate(&self) -> Result<(), FerryError> {
        if self.agent.bot_name.is_empty() {
            return Err(FerryError::Config("agent.bot_name must not be empty".into()));
        }
        if self.chat.app_id.is_none() || self.chat.app_secret.is_none() {
            return Err(FerryError::Config(
                "chat.app_id and chat.app_secret are required (FERRY_CHAT_APP_ID / FERRY_CHAT_APP_SECRET)"
                    .into(),
            ));
        }
        if self.backend.working_dir.is_empty() {
            return Err(FerryError::Config("backend.working_dir must not be empty".into()));
        }
        if !(-1..24).contains(&self.session.reset_hour) {
            return Err(FerryError::Config(format!(
                "session.reset_hour must be 0-23 or -1 to disable, got {}",
                self.session.reset_hour
            )));
        }
        Ok(())
    }

    /// The freshness policy the reconciler evaluates sessions against.
    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            idle_timeout_secs: self.session.idle_minutes * 60,
            reset_hour: self.session.reset_hour,
        }
    }
}

/// Agent identity and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the bot, also fed to the classifier strategy.
    #[serde(default = "default_bot_name")]
    pub bot_name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bot_name: default_bot_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_bot_name() -> String {
    "ferry".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Chat platform integration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfig {
    /// Platform app id. Required to serve.
    #[serde(default)]
    pub app_id: Option<String>,

    /// Platform app secret. Required to serve.
    #[serde(default)]
    pub app_secret: Option<String>,

    /// Platform REST base URL.
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,

    /// Bind address for the inbound event webhook.
    #[serde(default = "default_webhook_bind")]
    pub webhook_bind: String,

    /// Directory for downloaded image attachments.
    #[serde(default = "default_image_dir")]
    pub image_dir: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            app_secret: None,
            base_url: default_chat_base_url(),
            webhook_bind: default_webhook_bind(),
            image_dir: default_image_dir(),
        }
    }
}

fn default_chat_base_url() -> String {
    "https://open.feishu.cn/open-apis".to_string()
}

fn default_webhook_bind() -> String {
    "127.0.0.1:9898".to_string()
}

fn default_image_dir() -> String {
    std::env::temp_dir()
        .join("ferry-images")
        .to_string_lossy()
        .into_owned()
}

/// AI backend sub-process.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Executable spawned as the backend (speaks JSON-RPC on stdio).
    #[serde(default = "default_backend_program")]
    pub program: String,

    /// Working directory the sub-process runs in.
    #[serde(default = "default_working_dir")]
    pub working_dir: String,

    /// Optional model override passed to the sub-process.
    #[serde(default)]
    pub model: Option<String>,

    /// Per-request timeout in seconds (turns can run for minutes).
    #[serde(default = "default_backend_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            program: default_backend_program(),
            working_dir: default_working_dir(),
            model: None,
            request_timeout_secs: default_backend_timeout(),
        }
    }
}

fn default_backend_program() -> String {
    "codex".to_string()
}

fn default_working_dir() -> String {
    ".".to_string()
}

fn default_backend_timeout() -> u64 {
    300
}

/// Relevance classifier (OpenAI-compatible chat completion endpoint).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    /// API key. `None` disables the classifier.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_classifier_base_url")]
    pub base_url: String,

    #[serde(default = "default_classifier_model")]
    pub model: String,

    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_classifier_base_url(),
            model: default_classifier_model(),
            timeout_secs: default_classifier_timeout(),
        }
    }
}

fn default_classifier_base_url() -> String {
    "https://api.moonshot.cn/v1".to_string()
}

fn default_classifier_model() -> String {
    "moonshot-v1-8k".to_string()
}

fn default_classifier_timeout() -> u64 {
    30
}

/// Session store and freshness.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Path to the SQLite database file (holds all Ferry tables).
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Idle timeout in minutes. Zero disables the idle check.
    #[serde(default = "default_idle_minutes")]
    pub idle_minutes: i64,

    /// Daily reset hour in local time (0-23), -1 to disable.
    #[serde(default = "default_reset_hour")]
    pub reset_hour: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            idle_minutes: default_idle_minutes(),
            reset_hour: default_reset_hour(),
        }
    }
}

fn default_db_path() -> String {
    dirs::home_dir()
        .unwrap_or_else(|| ".".into())
        .join(".ferry")
        .join("sessions.db")
        .to_string_lossy()
        .into_owned()
}

fn default_idle_minutes() -> i64 {
    60
}

fn default_reset_hour() -> i32 {
    4
}

/// History truncation for prompt assembly.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    /// Tail count kept unconditionally. Zero or negative keeps everything.
    #[serde(default = "default_max_history_count")]
    pub max_count: i64,

    /// Time window (minutes) for older messages beyond the tail.
    #[serde(default = "default_max_history_minutes")]
    pub max_minutes: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_count: default_max_history_count(),
            max_minutes: default_max_history_minutes(),
        }
    }
}

fn default_max_history_count() -> i64 {
    15
}

fn default_max_history_minutes() -> i64 {
    120
}

/// Digest scheduler cadence.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DigestConfig {
    #[serde(default = "default_digest_interval")]
    pub interval_minutes: u64,

    #[serde(default = "default_cleanup_hours")]
    pub cleanup_interval_hours: u64,

    /// Processed rows older than this are garbage-collected.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_digest_interval(),
            cleanup_interval_hours: default_cleanup_hours(),
            retention_hours: default_retention_hours(),
        }
    }
}

fn default_digest_interval() -> u64 {
    60
}

fn default_cleanup_hours() -> u64 {
    6
}

fn default_retention_hours() -> u64 {
    24
}

/// Tool-surface HTTP server. Loopback only: the port is shared with the
/// co-located backend sub-process via the `FERRY_TOOLS_URL` env var.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
        }
    }
}

fn default_gateway_bind() -> String {
    "127.0.0.1:8787".to_string()
}
