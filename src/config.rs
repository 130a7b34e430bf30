//! Configuration management for the research agents.
//!
//! Configuration is read from environment variables (a `.env` file is loaded
//! first by the binary):
//! - `OPENROUTER_API_KEY` - Required. Falls back to `OPENAI_API_KEY`.
//! - `OPENROUTER_BASE_URL` - Optional. Defaults to `https://openrouter.ai/api/v1`.
//! - `MODEL_NAME` - Optional. Model for every agent. Defaults to `z-ai/glm-4.5-air:free`.
//! - `HTTP_REFERER` / `APP_TITLE` - Optional. Attribution headers sent to OpenRouter.
//! - `RESEARCHER_MAX_STEPS`, `ANALYST_MAX_STEPS`, `WRITER_MAX_STEPS` - Optional.
//!   Step budgets. Default to `10`, `20` and `5`.
//! - `LLM_MAX_RETRIES` - Optional. Retries for transient model failures. Defaults to `3`.
//! - `LLM_RETRY_BASE_MS` / `LLM_RETRY_MAX_MS` - Optional. Backoff bounds. Default to `1000` / `30000`.
//! - `LLM_TIMEOUT_SECS` - Optional. Per-request timeout. Defaults to `120`.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::llm::{BackoffConfig, RetryPolicy};

pub const DEFAULT_MODEL: &str = "z-ai/glm-4.5-air:free";
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_HTTP_REFERER: &str = "http://localhost:3000";
pub const DEFAULT_APP_TITLE: &str = "AI Agents Project";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Step budgets for the three specialists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepBudgets {
    pub researcher: usize,
    pub analyst: usize,
    pub writer: usize,
}

impl Default for StepBudgets {
    fn default() -> Self {
        Self {
            researcher: 10,
            analyst: 20,
            writer: 5,
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenRouter API key
    pub api_key: String,

    /// Model identifier (OpenRouter format)
    pub model: String,

    /// Chat completions base URL
    pub base_url: String,

    pub http_referer: String,

    pub app_title: String,

    pub step_budgets: StepBudgets,

    /// Retries after the first attempt for transient model failures
    pub max_retries: u32,

    pub retry_base_delay: Duration,

    pub retry_max_delay: Duration,

    /// Timeout for a single model request
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if neither `OPENROUTER_API_KEY`
    /// nor `OPENAI_API_KEY` is set, and `ConfigError::InvalidValue` for
    /// unparseable numbers.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let api_key = non_empty("OPENROUTER_API_KEY")
            .or_else(|| non_empty("OPENAI_API_KEY"))
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENROUTER_API_KEY".to_string()))?;

        let defaults = StepBudgets::default();
        let step_budgets = StepBudgets {
            researcher: parse_var(&lookup, "RESEARCHER_MAX_STEPS", defaults.researcher)?,
            analyst: parse_var(&lookup, "ANALYST_MAX_STEPS", defaults.analyst)?,
            writer: parse_var(&lookup, "WRITER_MAX_STEPS", defaults.writer)?,
        };

        Ok(Self {
            api_key,
            model: lookup("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: lookup("OPENROUTER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            http_referer: lookup("HTTP_REFERER")
                .unwrap_or_else(|| DEFAULT_HTTP_REFERER.to_string()),
            app_title: lookup("APP_TITLE").unwrap_or_else(|| DEFAULT_APP_TITLE.to_string()),
            step_budgets,
            max_retries: parse_var(&lookup, "LLM_MAX_RETRIES", 3)?,
            retry_base_delay: Duration::from_millis(parse_var(&lookup, "LLM_RETRY_BASE_MS", 1000)?),
            retry_max_delay: Duration::from_millis(parse_var(&lookup, "LLM_RETRY_MAX_MS", 30_000)?),
            request_timeout: Duration::from_secs(parse_var(&lookup, "LLM_TIMEOUT_SECS", 120)?),
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            http_referer: DEFAULT_HTTP_REFERER.to_string(),
            app_title: DEFAULT_APP_TITLE.to_string(),
            step_budgets: StepBudgets::default(),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            retry_max_delay: Duration::from_millis(30_000),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Retry policy for the model client.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: BackoffConfig {
                base_delay: self.retry_base_delay,
                max_delay: self.retry_max_delay.max(self.retry_base_delay),
                ..BackoffConfig::default()
            },
        }
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        None => Ok(default),
    }
}
