//! Configuration loading and management for politiko.
//!
//! Loads settings from `politiko.toml` with environment variable overrides for sensitive data.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const PERPLEXITY_KEY_VAR: &str = "PERPLEXITY_API_KEY";
pub const TRANSLATE_KEY_VAR: &str = "GOOGLE_TRANSLATE_API_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("missing required API key for provider: {0}")]
    MissingApiKey(String),
}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Chat completions endpoint
    pub endpoint: String,
    /// Model identifier (e.g., "sonar")
    pub model: String,
    /// System message sent with every prompt
    pub system_prompt: String,
    pub temperature: f32,
    pub top_p: f32,
    /// Search recency window: "day", "week", "month" or "year"
    pub recency_filter: String,
    /// Trusted domains the model may cite; mirrored into every request
    pub domains: Vec<String>,
    /// Upper bound on a single upstream call, including reading the body
    pub timeout_secs: u64,
    /// Extra attempts after a transient upstream failure
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

/// Translation provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
    /// Extra attempts after a transient provider failure
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Cache translated records by content hash
    pub cache: bool,
}

/// API keys configuration (loaded from environment)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub perplexity_key: Option<String>,
    #[serde(default)]
    pub translate_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sled,
    Memory,
}

/// Cache store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Base path for the sled database
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from the default location (politiko.toml in cwd or home).
    ///
    /// Falls back to built-in defaults when no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::read_file(&path)?,
            None => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env();
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Override API keys from environment variables
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(PERPLEXITY_KEY_VAR) {
            self.api.perplexity_key = Some(key);
        }
        if let Ok(key) = std::env::var(TRANSLATE_KEY_VAR) {
            self.api.translate_key = Some(key);
        }
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from("politiko.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let home_config = dirs::home_dir()?
            .join(".config")
            .join("politiko")
            .join("politiko.toml");
        home_config.exists().then_some(home_config)
    }

    pub fn perplexity_key(&self) -> Result<&str, ConfigError> {
        self.api
            .perplexity_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey("perplexity".to_string()))
    }

    pub fn translate_key(&self) -> Result<&str, ConfigError> {
        self.api
            .translate_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey("google-translate".to_string()))
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.perplexity.ai/chat/completions".to_string(),
            model: "sonar".to_string(),
            system_prompt: "Be precise and concise. Answer only with the JSON object requested."
                .to_string(),
            temperature: 0.2,
            top_p: 0.9,
            recency_filter: "month".to_string(),
            domains: [
                "rappler.com",
                "inquirer.net",
                "philstar.com",
                "gmanetwork.com",
                "abs-cbn.com",
                "senate.gov.ph",
                "congress.gov.ph",
                "comelec.gov.ph",
                "officialgazette.gov.ph",
                "sandiganbayan.gov.ph",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 1000,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://translation.googleapis.com/language/translate/v2".to_string(),
            timeout_secs: 30,
            max_retries: 2,
            retry_backoff_ms: 500,
            cache: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sled,
            path: PathBuf::from("./data"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}
