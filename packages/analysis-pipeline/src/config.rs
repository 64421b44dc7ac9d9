use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Pipeline configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database_url: String,

    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,

    /// Per-backend cooldown after a failure.
    pub backend_cooldown: Duration,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,

    pub worker_batch_size: i64,
    pub worker_poll_interval: Duration,
    pub worker_pace_delay: Duration,
    pub worker_concurrency: usize,
    pub lease_ms: i64,

    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub notify_min_score: u8,
}

impl PipelineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let config = Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_model: env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            gemini_api_key: env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            backend_cooldown: Duration::from_secs(
                parse_env("BACKEND_COOLDOWN_SECS", 60)?,
            ),
            retry_max_attempts: parse_env("RETRY_MAX_ATTEMPTS", 3)?,
            retry_base_delay: Duration::from_secs(parse_env("RETRY_BASE_DELAY_SECS", 30)?),
            worker_batch_size: parse_env("WORKER_BATCH_SIZE", 10)?,
            worker_poll_interval: Duration::from_secs(parse_env("WORKER_POLL_SECS", 30)?),
            worker_pace_delay: Duration::from_secs(parse_env("WORKER_PACE_SECS", 1)?),
            worker_concurrency: parse_env("WORKER_CONCURRENCY", 2)?,
            lease_ms: parse_env("LEASE_MS", 300_000)?,
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok().filter(|t| !t.is_empty()),
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID").ok().filter(|c| !c.is_empty()),
            notify_min_score: parse_env("NOTIFY_MIN_SCORE", 7)?,
        };

        if config.openai_api_key.is_none() && config.gemini_api_key.is_none() {
            bail!("at least one of OPENAI_API_KEY / GEMINI_API_KEY must be set");
        }
        Ok(config)
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{key} must be a valid number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}
