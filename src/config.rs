use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::core::{MatchingPolicy, PoolConfig};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub gemini: GeminiSettings,
    #[serde(default)]
    pub telegram: TelegramSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            queue_capacity: default_queue_capacity(),
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}

fn default_concurrency() -> usize { 3 }
fn default_queue_capacity() -> usize { 100 }
fn default_job_timeout_secs() -> u64 { 120 }

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_creation_threshold")]
    pub creation_threshold: f64,
    #[serde(default = "default_notify_threshold")]
    pub notify_threshold: f64,
    #[serde(default = "default_age_window_years")]
    pub age_window_years: i32,
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            creation_threshold: default_creation_threshold(),
            notify_threshold: default_notify_threshold(),
            age_window_years: default_age_window_years(),
            candidate_limit: default_candidate_limit(),
            notify_timeout_secs: default_notify_timeout_secs(),
        }
    }
}

fn default_creation_threshold() -> f64 { 0.6 }
fn default_notify_threshold() -> f64 { 0.8 }
fn default_age_window_years() -> i32 { 15 }
fn default_candidate_limit() -> usize { 20 }
fn default_notify_timeout_secs() -> u64 { 30 }

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    #[serde(default = "default_gemini_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_gemini_temperature")]
    pub temperature: f32,
    #[serde(default = "default_gemini_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_gemini_endpoint(),
            model: default_gemini_model(),
            temperature: default_gemini_temperature(),
            request_timeout_secs: default_gemini_timeout_secs(),
        }
    }
}

fn default_gemini_endpoint() -> String { "https://generativelanguage.googleapis.com".to_string() }
fn default_gemini_model() -> String { "gemini-2.0-flash".to_string() }
fn default_gemini_temperature() -> f32 { 0.4 }
fn default_gemini_timeout_secs() -> u64 { 30 }

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSettings {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: default_telegram_api_base(),
        }
    }
}

impl TelegramSettings {
    /// Bot token and chat id, when both are set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let token = self.bot_token.as_deref().filter(|t| !t.is_empty())?;
        let chat_id = self.chat_id.as_deref().filter(|c| !c.is_empty())?;
        Some((token, chat_id))
    }
}

fn default_telegram_api_base() -> String { "https://api.telegram.org".to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with TRACEO__)
    /// 5. Well-known variables: DATABASE_URL, GEMINI_API_KEY, TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., TRACEO__WORKER__CONCURRENCY -> worker.concurrency
            .add_source(
                Environment::with_prefix("TRACEO")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings = apply_env_overrides(settings, |var| std::env::var(var).ok())?;

        let settings: Settings = settings.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("TRACEO")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.matching;
        if !(0.0..=1.0).contains(&m.creation_threshold) || !(0.0..=1.0).contains(&m.notify_threshold) {
            return Err(ConfigError::Message(
                "matching thresholds must lie in [0, 1]".to_string(),
            ));
        }
        if m.creation_threshold > m.notify_threshold {
            return Err(ConfigError::Message(
                "matching.creation_threshold must not exceed matching.notify_threshold".to_string(),
            ));
        }
        if self.worker.concurrency == 0 || self.worker.queue_capacity == 0 {
            return Err(ConfigError::Message(
                "worker.concurrency and worker.queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn matching_policy(&self) -> MatchingPolicy {
        MatchingPolicy {
            creation_threshold: self.matching.creation_threshold,
            notify_threshold: self.matching.notify_threshold,
            age_window_years: self.matching.age_window_years,
            candidate_limit: self.matching.candidate_limit,
            notify_timeout: Duration::from_secs(self.matching.notify_timeout_secs),
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            concurrency: self.worker.concurrency,
            queue_capacity: self.worker.queue_capacity,
            job_timeout: Duration::from_secs(self.worker.job_timeout_secs),
        }
    }
}

/// Apply well-known environment variables on top of the layered config
///
/// Only variables that are set override; everything else keeps the value
/// from the files or `TRACEO__*` variables.
fn apply_env_overrides<F>(settings: Config, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut builder = Config::builder().add_source(settings);

    let overrides = [
        ("DATABASE_URL", "database.url"),
        ("GEMINI_API_KEY", "gemini.api_key"),
        ("TELEGRAM_BOT_TOKEN", "telegram.bot_token"),
        ("TELEGRAM_CHAT_ID", "telegram.chat_id"),
    ];

    for (var, key) in overrides {
        if let Some(value) = lookup(var) {
            builder = builder.set_override(key, value)?;
        }
    }

    builder.build()
}
