use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, UnibotError};

/// Top-level configuration for the unibot application.
///
/// Loaded from `~/.unibot/config.toml` by default. Each section corresponds
/// to one subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnibotConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default = "default_bots")]
    pub bots: Vec<BotConfig>,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub keywords: KeywordsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for UnibotConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            bots: default_bots(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            worker: WorkerConfig::default(),
            keywords: KeywordsConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl UnibotConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: UnibotConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check that every setting required at startup is present and sane,
    /// reading secrets from the process environment.
    pub fn validate(&self) -> Result<()> {
        self.validate_with_env(|name| std::env::var(name).ok())
    }

    /// Same as [`validate`](Self::validate) with an injectable environment
    /// lookup.
    pub fn validate_with_env<F>(&self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut problems = Vec::new();

        if !self.bots.iter().any(|b| b.enabled) {
            problems.push("no bot is enabled".to_string());
        }
        for bot in &self.bots {
            if bot.name.trim().is_empty() {
                problems.push("bot name must not be empty".to_string());
            }
        }
        let mut names: Vec<&str> = self.bots.iter().map(|b| b.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            problems.push("bot names must be unique".to_string());
        }

        if !self.llm.offline {
            let key = env(&self.llm.api_key_env).unwrap_or_default();
            if key.trim().is_empty() {
                problems.push(format!("{} is not set", self.llm.api_key_env));
            }
        }

        let r = &self.retrieval;
        if r.chunk_size == 0 || r.chunk_overlap >= r.chunk_size {
            problems.push(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                r.chunk_overlap, r.chunk_size
            ));
        }
        if r.top_k == 0 {
            problems.push("top_k must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&r.similarity_threshold) {
            problems.push(format!(
                "similarity_threshold {} outside [0, 1]",
                r.similarity_threshold
            ));
        }
        if self.worker.max_messages_per_minute == 0 {
            problems.push("max_messages_per_minute must be at least 1".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(UnibotError::Config(problems.join("; ")))
        }
    }

    /// Enabled bot definitions in configuration order.
    pub fn enabled_bots(&self) -> impl Iterator<Item = &BotConfig> {
        self.bots.iter().filter(|b| b.enabled)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for SQLite and the knowledge index.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Port of the status API.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.unibot/data".to_string(),
            log_level: "info".to_string(),
            port: 3040,
        }
    }
}

/// One supervised bot identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    pub name: String,
    /// Browser profile / session directory used by the channel adapter.
    #[serde(default)]
    pub user_data_path: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_bots() -> Vec<BotConfig> {
    vec![
        BotConfig {
            name: "Bot_Primary".to_string(),
            user_data_path: "~/.unibot/sessions/bot1".to_string(),
            enabled: true,
        },
        BotConfig {
            name: "Bot_Secondary".to_string(),
            user_data_path: "~/.unibot/sessions/bot2".to_string(),
            enabled: false,
        },
    ]
}

/// Generation / embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Use deterministic in-process mocks instead of the HTTP provider.
    pub offline: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            temperature: 0.3,
            max_tokens: 1000,
            timeout_secs: 60,
            offline: false,
        }
    }
}

/// Knowledge retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Index snapshot file, relative to the data directory unless absolute.
    pub index_path: String,
    /// Knowledge-base CSV with Question, Answer, Category, Interface columns.
    pub faq_csv_path: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub similarity_threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_path: "knowledge_index.json".to_string(),
            faq_csv_path: "data/faq_database.csv".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 4,
            similarity_threshold: 0.65,
        }
    }
}

/// Per-bot worker loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Sleep between polls when no unread messages are found.
    pub idle_interval_secs: u64,
    /// Default graceful-shutdown bound for `stop`.
    pub stop_timeout_secs: u64,
    /// Outbound send budget per bot.
    pub max_messages_per_minute: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: 10,
            stop_timeout_secs: 30,
            max_messages_per_minute: 10,
        }
    }
}

/// Keyword configuration file location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordsConfig {
    pub path: String,
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            path: "config/keywords.json".to_string(),
        }
    }
}

/// SQLite storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file name inside the data directory.
    pub db_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_file: "unibot.db".to_string(),
        }
    }
}
