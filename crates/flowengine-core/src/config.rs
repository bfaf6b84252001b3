use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Realtime-plane constants (§4.7/§5 of the spec).
pub const MAX_PAYLOAD_BYTES: usize = 128 * 1024;
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const HEARTBEAT_GRACE_SECS: u64 = 10;
pub const UPSTREAM_IDLE_TIMEOUT_SECS: u64 = 120;
pub const STREAMING_INACTIVITY_BUDGET_SECS: u64 = 90;
pub const SINGLE_FLIGHT_WAIT_SECS: u64 = 60;
pub const TYPING_REFRESH_SECS: u64 = 4;
pub const DEDUP_WINDOW_SECS: u64 = 2;
pub const CHAT_PLATFORM_MAX_CHARS: usize = 4_096;
pub const CHAT_PLATFORM_CHUNK_AT: usize = 4_090;
pub const MAX_AUTO_ADVANCE: u32 = 10;
pub const AUTO_ADVANCE_SENTINEL: &str = "[AUTO_ADVANCE]";
pub const MAX_USER_MESSAGE_CHARS: usize = 10_000;

/// Top-level config (`flowengine.toml` + `FLOWENGINE_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            llm: LlmConfig {
                provider: "anthropic".to_string(),
                anthropic: None,
                openai: None,
            },
            sessions: SessionsConfig::default(),
            telegram: None,
            webhooks: WebhooksConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_upstream_idle_timeout")]
    pub upstream_idle_timeout_secs: u64,
    #[serde(default = "default_cleanup_delay")]
    pub cleanup_delay_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            upstream_idle_timeout_secs: default_upstream_idle_timeout(),
            cleanup_delay_secs: default_cleanup_delay(),
        }
    }
}

/// Which LLM provider backs the chat contract, and its credentials.
///
/// Providers are tagged-variant constructors selected at startup from this
/// struct — the `provider` field names one of the `Option` slots below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub anthropic: Option<AnthropicConfig>,
    pub openai: Option<OpenAiConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
    #[serde(default = "default_anthropic_model")]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Optional TTL in seconds; `None` means sessions never expire.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            ttl_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Symmetric key (hex) used to encrypt the bot token at rest. Held in
    /// memory only; never logged.
    pub credential_encryption_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhooksConfig {
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_port() -> u16 {
    8088
}
fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_heartbeat_interval() -> u64 {
    HEARTBEAT_INTERVAL_SECS
}
fn default_upstream_idle_timeout() -> u64 {
    UPSTREAM_IDLE_TIMEOUT_SECS
}
fn default_cleanup_delay() -> u64 {
    30
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.flowengine/flowengine.db")
}

impl EngineConfig {
    /// Load config from a TOML file with `FLOWENGINE_*` env var overrides.
    ///
    /// Checks, in order: an explicit path argument, then
    /// `~/.flowengine/flowengine.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: EngineConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("FLOWENGINE_").split("_"))
            .extract()
            .map_err(|e| crate::error::EngineError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.flowengine/flowengine.toml")
}
