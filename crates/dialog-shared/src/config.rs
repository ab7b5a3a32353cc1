//! Configuration management

use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::constants::{
    DEFAULT_GENERATION_TIMEOUT_SECS, DEFAULT_IDLE_WORKER_SECS, DEFAULT_MAILBOX_CAPACITY,
    DEFAULT_MAX_COMPACTION_ROUNDS, DEFAULT_REDIS_PORT, DEFAULT_SAMPLE_INTERVAL_SECS,
    DEFAULT_SYSTEM_PROMPT,
};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub app: AppSettings,
    pub redis: RedisSettings,
    pub engine: EngineSettings,
    pub conversation: ConversationSettings,
    pub metrics: MetricsSettings,
    pub log: LogSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub env: String,
    pub host: String,
    pub port: u16,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub max_connections: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineSettings {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationSettings {
    pub system_prompt: String,
    pub max_compaction_rounds: usize,
    /// Zero disables the per-attempt timeout.
    pub generation_timeout_seconds: u64,
    pub mailbox_capacity: usize,
    pub idle_worker_seconds: u64,
}

impl ConversationSettings {
    pub fn generation_timeout(&self) -> Option<Duration> {
        (self.generation_timeout_seconds > 0)
            .then(|| Duration::from_secs(self.generation_timeout_seconds))
    }

    pub fn idle_worker_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_worker_seconds.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsSettings {
    pub sample_interval_seconds: u64,
}

impl MetricsSettings {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_seconds.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
    /// `json` or `pretty`.
    pub format: String,
    /// Daily-rolling log files are written here when set.
    pub directory: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let cache_address = std::env::var("CACHE_ADDRESS").ok();
        Self::builder(&env, cache_address.as_deref())?
            .build()?
            .try_deserialize()
    }

    /// Layered sources: defaults, `config/default`, `config/{env}`, `DIALOG__*` variables.
    /// A bare cache host (the `CACHE_ADDRESS` convention) overrides `redis.url` last.
    pub fn builder(
        env: &str,
        cache_address: Option<&str>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let redis_override = cache_address
            .filter(|host| !host.trim().is_empty())
            .map(|host| format!("redis://{}:{}", host.trim(), DEFAULT_REDIS_PORT));

        Config::builder()
            .set_default("app.env", env)?
            .set_default("app.host", "127.0.0.1")?
            .set_default("app.port", 8080)?
            .set_default("app.name", "dialog-server")?
            .set_default("redis.url", format!("redis://localhost:{}", DEFAULT_REDIS_PORT))?
            .set_default("redis.max_connections", 16)?
            .set_default("engine.base_url", "http://127.0.0.1:8081")?
            .set_default("engine.timeout_seconds", DEFAULT_GENERATION_TIMEOUT_SECS as i64)?
            .set_default("engine.max_tokens", 512)?
            .set_default("engine.temperature", 0.2)?
            .set_default("conversation.system_prompt", DEFAULT_SYSTEM_PROMPT)?
            .set_default(
                "conversation.max_compaction_rounds",
                DEFAULT_MAX_COMPACTION_ROUNDS as i64,
            )?
            .set_default(
                "conversation.generation_timeout_seconds",
                DEFAULT_GENERATION_TIMEOUT_SECS as i64,
            )?
            .set_default("conversation.mailbox_capacity", DEFAULT_MAILBOX_CAPACITY as i64)?
            .set_default("conversation.idle_worker_seconds", DEFAULT_IDLE_WORKER_SECS as i64)?
            .set_default(
                "metrics.sample_interval_seconds",
                DEFAULT_SAMPLE_INTERVAL_SECS as i64,
            )?
            .set_default("log.level", "info")?
            .set_default("log.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("DIALOG")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("redis.url", redis_override)
    }
}
