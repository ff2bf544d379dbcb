// src/config.rs
//! Process configuration, loaded once from the environment (and an optional
//! `.env` file) and exposed as a read-only global, referenced throughout the
//! HTTP handlers.

use once_cell::sync::Lazy;
use std::time::Duration;

/// Global, read-only configuration. Populated on first access.
pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,

    /// DSN for the relational ConversationStore and document MessageStore.
    /// A single SQLite pool backs both logical stores.
    pub database_url: String,

    /// Model used for the auto-title job when the conversation's own model
    /// is unavailable or a lighter model is preferred.
    pub default_model: String,

    pub chat_total_timeout: Duration,
    pub chat_idle_timeout: Duration,

    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
}

impl Config {
    fn from_env() -> Self {
        // Non-fatal: a missing .env is normal in production.
        let _ = dotenvy::dotenv();

        Self {
            api_host: env_or("API_HOST", "0.0.0.0"),
            api_port: env_or("API_PORT", "8000").parse().unwrap_or(8000),
            database_url: env_or("DATABASE_URL", "sqlite://dagchat.db?mode=rwc"),
            default_model: env_or("DEFAULT_MODEL", "echo"),
            chat_total_timeout: Duration::from_secs(env_secs("CHAT_TOTAL_TIMEOUT_SEC", 120)),
            chat_idle_timeout: Duration::from_secs(env_secs("CHAT_IDLE_TIMEOUT_SEC", 30)),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            anthropic_base_url: env_or("ANTHROPIC_BASE_URL", "https://api.anthropic.com/v1"),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_secs(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
