use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::knowledge::ranker::FallbackPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub handover: HandoverConfig,
    pub knowledge: KnowledgeConfig,
    pub llm: LLMConfig,
    pub messenger: MessengerConfig,
    pub server: ServerConfig,
    pub system: SystemConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoverConfig {
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub history_capacity: usize,
    /// Phrases that hand a conversation straight back to automation.
    pub resume_keywords: Vec<String>,
    pub resume_notice: String,
}

impl Default for HandoverConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 60,
            sweep_interval_secs: 60,
            history_capacity: 20,
            resume_keywords: vec!["#bot".to_string()],
            resume_notice: "Our automated assistant is back. Ask away any time!".to_string(),
        }
    }
}

impl HandoverConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub ttl_secs: u64,
    pub top_k: usize,
    pub min_token_chars: usize,
    pub fallback: FallbackPolicy,
    pub fetch_timeout_ms: u64,
    pub sheets_base_url: String,
    pub range: String,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            top_k: 5,
            min_token_chars: 3,
            fallback: FallbackPolicy::FirstK,
            fetch_timeout_ms: 10_000,
            sheets_base_url: "https://sheets.googleapis.com".to_string(),
            range: "A:Z".to_string(),
        }
    }
}

impl KnowledgeConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub base_url: String,
    pub max_retries: u32,
    pub persona: String,
    /// Sent to the user when reply generation fails.
    pub fallback_reply: String,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            max_tokens: 500,
            temperature: 0.7,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            max_retries: 3,
            persona: "You are the page administrator. Answer questions briefly and politely, \
                      using the reference data as your primary source. If the reference data \
                      does not contain the answer, say that a staff member will follow up \
                      instead of guessing."
                .to_string(),
            fallback_reply: "Sorry, we are busy right now. Please try again in a moment."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessengerConfig {
    pub graph_url: String,
    pub max_message_chars: usize,
    /// Metadata tag attached to bot replies so their echoes can be told apart from operators.
    pub bot_metadata: String,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            graph_url: "https://graph.facebook.com/v19.0".to_string(),
            max_message_chars: 1999,
            bot_metadata: "BOT_REPLY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub channel_buffer_size: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        let config = Config::builder()
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(env_overlay())
            .build()?;

        config.try_deserialize()
    }

    /// Load from an explicit file, still honouring `APP__` overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path))
            .add_source(env_overlay())
            .build()?;

        config.try_deserialize()
    }
}

/// `APP__SECTION__FIELD` variables; list fields take comma-separated values,
/// e.g. `APP__HANDOVER__RESUME_KEYWORDS="#bot,talk to bot"`.
fn env_overlay() -> Environment {
    Environment::with_prefix("APP")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("handover.resume_keywords")
}

/// Credentials that never live in config files.
#[derive(Clone)]
pub struct Secrets {
    pub page_access_token: String,
    pub verify_token: String,
    pub gemini_api_key: String,
    pub sheets_api_key: String,
    pub spreadsheet_id: String,
}

impl Secrets {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            page_access_token: required_var("PAGE_ACCESS_TOKEN")?,
            verify_token: required_var("VERIFY_TOKEN")?,
            gemini_api_key: required_var("GEMINI_API_KEY")?,
            sheets_api_key: required_var("SHEETS_API_KEY")?,
            spreadsheet_id: required_var("SPREADSHEET_ID")?,
        })
    }
}

/// Read one secret from the environment.
pub fn required_var(name: &str) -> Result<String> {
    env::var(name).map_err(|_| anyhow::anyhow!("{} environment variable not set", name))
}
