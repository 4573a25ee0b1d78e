//! Environment-driven configuration.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// An environment variable holds an unparseable value.
    #[error("Invalid value for {var}: {value}")]
    InvalidVar { var: &'static str, value: String },
}

/// Runtime configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Gemini API key. Optional so read-only commands work without it.
    pub gemini_api_key: Option<String>,
    /// Gemini model identifier.
    pub gemini_model: String,
    /// Google Books API key; the API works without one at reduced quota.
    pub google_books_api_key: Option<String>,
    /// Questions per generated quiz.
    pub quiz_questions_count: u32,
    /// Generation attempts per workflow run.
    pub quiz_retry_limit: u32,
    /// Number of pipeline workers.
    pub quiz_worker_count: usize,
    /// Job queue capacity.
    pub quiz_queue_capacity: usize,
    /// Interval between periodic retry sweeps.
    pub quiz_retry_interval: Duration,
}

impl Config {
    /// Loads configuration from the environment.
    ///
    /// `DATABASE_URL` is required; everything else has a default or is
    /// optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: require("DATABASE_URL")?,
            gemini_api_key: optional("GEMINI_API_KEY"),
            gemini_model: optional("GEMINI_MODEL")
                .unwrap_or_else(|| "gemini-1.5-flash".to_string()),
            google_books_api_key: optional("GOOGLE_BOOKS_API_KEY"),
            quiz_questions_count: parsed("QUIZ_QUESTIONS_COUNT", 5)?,
            quiz_retry_limit: parsed("QUIZ_RETRY_LIMIT", 3)?,
            quiz_worker_count: parsed("QUIZ_WORKER_COUNT", 3)?,
            quiz_queue_capacity: parsed("QUIZ_QUEUE_CAPACITY", 100)?,
            quiz_retry_interval: Duration::from_secs(parsed(
                "QUIZ_RETRY_INTERVAL_SECS",
                3600u64,
            )?),
        })
    }
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    optional(var).ok_or(ConfigError::MissingVar(var))
}

fn optional(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(var) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidVar { var, value }),
        None => Ok(default),
    }
}
