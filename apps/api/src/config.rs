use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::guide::extract::DEFAULT_HALLS;

const MAX_TTL_HOURS: i64 = 24 * 365 * 10;

/// Application configuration loaded from environment variables.
/// Everything has a default; only malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub guide_pdf_path: PathBuf,
    pub data_dir: PathBuf,
    /// Unset means recommendations are served from cache only.
    pub anthropic_api_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub cache_ttl_hours: i64,
    pub llm_max_attempts: u32,
    pub llm_request_timeout_secs: u64,
    pub recommend_timeout_secs: u64,
    pub guide_halls: Vec<String>,
    /// Operations view: users counted as active within this window.
    pub activity_window_hours: i64,
    pub max_users_warning: usize,
    pub max_storage_warning_mb: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let guide_halls = match get("GUIDE_HALLS") {
            Some(list) => list
                .split(',')
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect(),
            None => DEFAULT_HALLS.iter().map(|h| h.to_string()).collect(),
        };

        let config = Config {
            guide_pdf_path: get("GUIDE_PDF_PATH")
                .unwrap_or_else(|| "data/event-guide.pdf".to_string())
                .into(),
            data_dir: get("DATA_DIR").unwrap_or_else(|| "data".to_string()).into(),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            port: parse_or(get("PORT"), "PORT", 8080)?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            cache_ttl_hours: parse_or(get("CACHE_TTL_HOURS"), "CACHE_TTL_HOURS", 72)?,
            llm_max_attempts: parse_or(get("LLM_MAX_ATTEMPTS"), "LLM_MAX_ATTEMPTS", 3)?,
            llm_request_timeout_secs: parse_or(
                get("LLM_REQUEST_TIMEOUT_SECS"),
                "LLM_REQUEST_TIMEOUT_SECS",
                20,
            )?,
            recommend_timeout_secs: parse_or(
                get("RECOMMEND_TIMEOUT_SECS"),
                "RECOMMEND_TIMEOUT_SECS",
                60,
            )?,
            guide_halls,
            activity_window_hours: parse_or(
                get("ACTIVITY_WINDOW_HOURS"),
                "ACTIVITY_WINDOW_HOURS",
                24,
            )?,
            max_users_warning: parse_or(get("MAX_USERS_WARNING"), "MAX_USERS_WARNING", 20_000)?,
            max_storage_warning_mb: parse_or(
                get("MAX_STORAGE_WARNING_MB"),
                "MAX_STORAGE_WARNING_MB",
                400,
            )?,
        };

        anyhow::ensure!(
            (1..=MAX_TTL_HOURS).contains(&config.cache_ttl_hours),
            "CACHE_TTL_HOURS must be between 1 and {MAX_TTL_HOURS}"
        );
        anyhow::ensure!(config.llm_max_attempts > 0, "LLM_MAX_ATTEMPTS must be at least 1");
        anyhow::ensure!(
            (1..=MAX_TTL_HOURS).contains(&config.activity_window_hours),
            "ACTIVITY_WINDOW_HOURS must be between 1 and {MAX_TTL_HOURS}"
        );
        anyhow::ensure!(!config.guide_halls.is_empty(), "GUIDE_HALLS must name at least one hall");
        Ok(config)
    }

    pub fn users_dir(&self) -> PathBuf {
        self.data_dir.join("users")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_ttl_hours)
    }

    pub fn activity_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.activity_window_hours)
    }

    pub fn llm_request_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_request_timeout_secs)
    }

    pub fn recommend_timeout(&self) -> Duration {
        Duration::from_secs(self.recommend_timeout_secs)
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}
